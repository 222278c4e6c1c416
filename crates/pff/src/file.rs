//! [PST File](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/6b57253b-0853-47bb-99bb-d4b8f78105f0)

use std::{
    cell::{Cell, OnceCell},
    fmt::Debug,
    fs::File,
    io::{self, BufReader, Read, Seek},
    path::Path,
    rc::Rc,
    str::FromStr,
};
use tracing::debug;

use crate::{
    codepage::Codepage,
    error::{PffError, PffResult},
    item::{Item, ItemSource},
    messaging::{item_tree::ItemTree, named_prop::NameToIdMap, store::MessageStore},
    ndb::{
        database::NodeDatabase,
        header::{ContentType, NdbCryptMethod},
        node_id::{NID_MESSAGE_STORE, NID_NAME_TO_ID_MAP},
        recover::RecoveredNodes,
        source::ByteSource,
    },
};

/// How a file is opened. Only reading is supported.
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub enum AccessMode {
    #[default]
    Read,
}

impl FromStr for AccessMode {
    type Err = PffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "rb" => Ok(AccessMode::Read),
            _ => Err(PffError::UnsupportedAccessMode(s.to_string())),
        }
    }
}

/// Everything tied to one open cycle. Dropping it releases the byte source and every cache.
pub(crate) struct OpenFile {
    database: NodeDatabase,
    item_tree: OnceCell<Rc<ItemTree>>,
    name_to_id_map: OnceCell<Option<Rc<NameToIdMap>>>,
    recovered: OnceCell<Rc<RecoveredNodes>>,
}

impl OpenFile {
    /// The message store must resolve down to its property context.
    fn open(source: Box<dyn ByteSource>) -> io::Result<Self> {
        let database = NodeDatabase::open(source)?;
        MessageStore::read(&database)?;
        Ok(Self {
            database,
            item_tree: Default::default(),
            name_to_id_map: Default::default(),
            recovered: Default::default(),
        })
    }

    pub(crate) fn database(&self) -> &NodeDatabase {
        &self.database
    }

    /// Built on first use.
    pub(crate) fn item_tree(&self) -> io::Result<Rc<ItemTree>> {
        if let Some(tree) = self.item_tree.get() {
            return Ok(Rc::clone(tree));
        }
        let tree = Rc::new(ItemTree::build(&self.database)?);
        Ok(Rc::clone(self.item_tree.get_or_init(|| tree)))
    }

    /// Decoded on first use; `None` when the file has no name-to-id map node.
    pub(crate) fn name_to_id_map(&self) -> io::Result<Option<Rc<NameToIdMap>>> {
        if let Some(map) = self.name_to_id_map.get() {
            return Ok(map.clone());
        }
        let map = match self.database.read_node_if_present(NID_NAME_TO_ID_MAP)? {
            Some(_) => Some(Rc::new(NameToIdMap::read(&self.database)?)),
            None => None,
        };
        Ok(self.name_to_id_map.get_or_init(|| map).clone())
    }

    /// Scanned for on first use.
    pub(crate) fn recovered(&self) -> io::Result<Rc<RecoveredNodes>> {
        if let Some(recovered) = self.recovered.get() {
            return Ok(Rc::clone(recovered));
        }
        let recovered = Rc::new(RecoveredNodes::recover(&self.database)?);
        Ok(Rc::clone(self.recovered.get_or_init(|| recovered)))
    }

    fn recovered_if_scanned(&self) -> Option<Rc<RecoveredNodes>> {
        self.recovered.get().cloned()
    }
}

#[derive(Default)]
enum HandleState {
    #[default]
    Unopened,
    Open(Rc<OpenFile>),
    Closed,
}

/// A handle on a PST, OST or PAB file.
///
/// The handle starts out unopened. [PffFile::open] and [PffFile::open_from_stream] move it to
/// open, [PffFile::close] to closed, and a closed handle may be opened again. Items hold weak
/// references to the open file, so they stop working once it is closed.
#[derive(Default)]
pub struct PffFile {
    state: HandleState,
    codepage: Rc<Cell<Codepage>>,
}

impl PffFile {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn open(&mut self, path: impl AsRef<Path>, mode: &str) -> PffResult<()> {
        self.check_not_open()?;
        mode.parse::<AccessMode>()?;

        let path = path.as_ref();
        debug!(path = %path.display(), "open file");
        let file = File::open(path).map_err(PffError::Io)?;
        self.open_source(Box::new(BufReader::new(file)))
    }

    /// Open any seekable stream. The handle keeps the stream until [PffFile::close].
    pub fn open_from_stream<S>(&mut self, stream: S, mode: &str) -> PffResult<()>
    where
        S: Read + Seek + 'static,
    {
        self.check_not_open()?;
        mode.parse::<AccessMode>()?;

        debug!("open stream");
        self.open_source(Box::new(stream))
    }

    fn open_source(&mut self, source: Box<dyn ByteSource>) -> PffResult<()> {
        let file = OpenFile::open(source).map_err(PffError::from_open)?;
        self.state = HandleState::Open(Rc::new(file));
        Ok(())
    }

    pub fn close(&mut self) -> PffResult<()> {
        let HandleState::Open(file) = &self.state else {
            return Err(PffError::NotOpen);
        };
        debug!(
            blocks = file.database().cached_block_count(),
            "close file"
        );
        self.state = HandleState::Closed;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, HandleState::Open(_))
    }

    pub fn ascii_codepage(&self) -> Codepage {
        self.codepage.get()
    }

    /// Accepts `ascii`, `cp1252`, `windows-1252` or a bare identifier such as `1252`.
    pub fn set_ascii_codepage(&mut self, name: &str) -> PffResult<()> {
        let codepage = name.parse::<Codepage>()?;
        self.codepage.set(codepage);
        Ok(())
    }

    pub fn set_ascii_codepage_id(&mut self, id: u32) -> PffResult<()> {
        let codepage = Codepage::try_from(id)?;
        self.codepage.set(codepage);
        Ok(())
    }

    /// Size the header declares (`ibFileEof`). It may run past the end of a truncated source.
    pub fn size(&self) -> PffResult<u64> {
        Ok(self.file()?.database().header().root().file_eof_index())
    }

    pub fn content_type(&self) -> PffResult<ContentType> {
        Ok(self.file()?.database().header().content_type())
    }

    pub fn encryption_type(&self) -> PffResult<NdbCryptMethod> {
        Ok(self.file()?.database().header().crypt_method())
    }

    pub fn message_store(&self) -> PffResult<Item> {
        let file = self.file()?;
        Ok(self.item(file, ItemSource::Node(NID_MESSAGE_STORE)))
    }

    pub fn name_to_id_map(&self) -> PffResult<Option<Rc<NameToIdMap>>> {
        Ok(self.file()?.name_to_id_map()?)
    }

    pub fn root_folder(&self) -> PffResult<Option<Item>> {
        let file = self.file()?;
        let tree = file.item_tree()?;
        Ok(tree
            .root_folder()
            .map(|node| self.item(file, ItemSource::Node(node))))
    }

    /// The internal root, parent of the root folder and of every node with parent 0.
    pub fn root_item(&self) -> PffResult<Item> {
        let file = self.file()?;
        Ok(self.item(file, ItemSource::Root))
    }

    pub fn number_of_orphan_items(&self) -> PffResult<usize> {
        Ok(self.file()?.item_tree()?.orphans().len())
    }

    pub fn orphan_item(&self, index: usize) -> PffResult<Item> {
        let file = self.file()?;
        let tree = file.item_tree()?;
        let node = tree.orphan(index).ok_or(PffError::OrphanIndexOutOfRange {
            index,
            count: tree.orphans().len(),
        })?;
        Ok(self.item(file, ItemSource::Node(node)))
    }

    pub fn orphan_items(&self) -> PffResult<Vec<Item>> {
        let file = self.file()?;
        let tree = file.item_tree()?;
        Ok(tree
            .orphans()
            .iter()
            .map(|node| self.item(file, ItemSource::Node(*node)))
            .collect())
    }

    /// Look for deleted items: stale NBT entries whose blocks still validate. Runs once per open
    /// cycle; later calls keep the first result.
    pub fn recover_items(&self) -> PffResult<()> {
        self.file()?.recovered()?;
        Ok(())
    }

    /// 0 until [PffFile::recover_items] has run.
    pub fn number_of_recovered_items(&self) -> PffResult<usize> {
        let file = self.file()?;
        Ok(file
            .recovered_if_scanned()
            .map(|recovered| recovered.len())
            .unwrap_or_default())
    }

    pub fn recovered_item(&self, index: usize) -> PffResult<Item> {
        let file = self.file()?;
        let recovered = file.recovered_if_scanned();
        let entries = recovered
            .as_deref()
            .map(RecoveredNodes::entries)
            .unwrap_or_default();
        let entry = entries
            .get(index)
            .ok_or(PffError::RecoveredIndexOutOfRange {
                index,
                count: entries.len(),
            })?;
        Ok(self.item(
            file,
            ItemSource::Recovered {
                index,
                node: entry.node(),
            },
        ))
    }

    pub fn recovered_items(&self) -> PffResult<Vec<Item>> {
        let file = self.file()?;
        let Some(recovered) = file.recovered_if_scanned() else {
            return Ok(vec![]);
        };
        Ok(recovered
            .entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                self.item(
                    file,
                    ItemSource::Recovered {
                        index,
                        node: entry.node(),
                    },
                )
            })
            .collect())
    }

    fn check_not_open(&self) -> PffResult<()> {
        if self.is_open() {
            return Err(PffError::AlreadyOpen);
        }
        Ok(())
    }

    fn file(&self) -> PffResult<&Rc<OpenFile>> {
        match &self.state {
            HandleState::Open(file) => Ok(file),
            _ => Err(PffError::NotOpen),
        }
    }

    fn item(&self, file: &Rc<OpenFile>, source: ItemSource) -> Item {
        Item::new(Rc::downgrade(file), Rc::clone(&self.codepage), source)
    }
}

impl Debug for PffFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Unopened => "unopened",
            HandleState::Open(_) => "open",
            HandleState::Closed => "closed",
        };
        f.debug_struct("PffFile")
            .field("state", &state)
            .field("codepage", &self.codepage.get())
            .finish()
    }
}
