use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::warn;
use rand::Rng;

use crate::errors::{Error, Result};
use crate::types::{TaxId, TAX_NO_PARENT, TAX_ROOT, TAX_UNKNOWN};

/// Retry budget for random id probing in `add_node`. Probing is unbounded in
/// principle; a bounded budget turns a saturated id space into an error
/// instead of a spin.
const MAX_ID_PROBES: u32 = 256;

/// In-memory taxonomic tree: an id -> parent map plus a name -> id lookup.
///
/// Invariant: exactly one node (`TAX_ROOT`) has parent `TAX_NO_PARENT`, and
/// every other node's parent chain terminates at the root without cycles.
/// Both maps are built at load time and read-mostly afterward; the only
/// mutation path is `add_node`, guarded by the capacity ceiling.
#[derive(Debug)]
pub struct Taxonomy {
    parent_map: HashMap<TaxId, TaxId>,
    name_map: HashMap<String, TaxId>,
    n_syn: u64,
    ceil: u32,
}

impl Taxonomy {
    /// Builds a tree from an already-assembled parent map. The root is
    /// force-inserted with parent `TAX_NO_PARENT`.
    pub fn from_parent_map(parent_map: HashMap<TaxId, TaxId>, ceil: u32) -> Self {
        let mut parent_map = parent_map;
        parent_map.insert(TAX_ROOT, TAX_NO_PARENT);
        Self {
            parent_map,
            name_map: HashMap::new(),
            n_syn: 0,
            ceil,
        }
    }

    /// Reads an NCBI-style nodes dump: pipe-delimited lines whose first field
    /// is the child id and whose second field is the parent id. Lines
    /// starting with `'\n'`, `'0'`, or `'#'` are skipped. The root is always
    /// force-inserted with parent `TAX_NO_PARENT` regardless of file content.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the nodes dump file.
    /// * `ceil` - The node capacity ceiling; 0 derives it from the map size.
    pub fn from_nodes_dump<P: AsRef<Path>>(path: P, ceil: u32) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_nodes_reader(BufReader::new(file), path.as_ref(), ceil)
    }

    fn from_nodes_reader<R: BufRead>(reader: R, path: &Path, ceil: u32) -> Result<Self> {
        let mut parent_map = HashMap::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            match line.as_bytes().first().copied() {
                None | Some(b'0') | Some(b'#') => continue,
                _ => {}
            }
            let parse = || -> Option<(TaxId, TaxId)> {
                let mut fields = line.split('|');
                let child = fields.next()?.trim().parse().ok()?;
                let parent = fields.next()?.trim().parse().ok()?;
                Some((child, parent))
            };
            let (child, parent) = parse().ok_or_else(|| Error::Parse {
                path: path.to_path_buf(),
                line: lineno + 1,
            })?;
            parent_map.insert(child, parent);
        }
        let mut tax = Self::from_parent_map(parent_map, ceil);
        if tax.ceil == 0 {
            tax.ceil = tax.parent_map.len() as u32 * 2;
        }
        Ok(tax)
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.parent_map.len()
    }

    pub fn contains(&self, id: TaxId) -> bool {
        self.parent_map.contains_key(&id)
    }

    /// Parent of `id`, or `None` if `id` is not in the tree. The root's
    /// parent is `TAX_NO_PARENT`.
    pub fn parent(&self, id: TaxId) -> Option<TaxId> {
        self.parent_map.get(&id).copied()
    }

    pub fn ceiling(&self) -> u32 {
        self.ceil
    }

    pub fn synonym_count(&self) -> u64 {
        self.n_syn
    }

    /// Looks up a node id by name.
    pub fn id_for_name(&self, name: &str) -> Option<TaxId> {
        self.name_map.get(name).copied()
    }

    /// Chain of ids from `id` up to and including the root.
    ///
    /// Fails with `UnknownTaxon` if any id on the chain is absent from the
    /// parent map.
    pub fn ancestor_chain(&self, id: TaxId) -> Result<Vec<TaxId>> {
        let mut chain = Vec::new();
        let mut node = id;
        while node != TAX_NO_PARENT {
            chain.push(node);
            node = self.parent(node).ok_or(Error::UnknownTaxon(node))?;
        }
        Ok(chain)
    }

    /// Number of steps from `id` up to the root: `depth(root) == 0`, and a
    /// child is one deeper than its parent.
    pub fn depth(&self, id: TaxId) -> Result<u32> {
        if !self.contains(id) {
            return Err(Error::UnknownTaxon(id));
        }
        let mut depth = 0;
        let mut node = id;
        while node != TAX_ROOT {
            node = self.parent(node).ok_or(Error::UnknownTaxon(node))?;
            depth += 1;
        }
        Ok(depth)
    }

    /// Lowest common ancestor of `a` and `b`.
    ///
    /// Collects `a`'s full ancestor chain (including `a`) into a set, then
    /// walks `b`'s chain (including `b`) and returns the first shared id.
    /// The root is an eventual common ancestor of any two well-formed chains.
    pub fn lowest_common_ancestor(&self, a: TaxId, b: TaxId) -> Result<TaxId> {
        let mut nodes = HashSet::new();
        let mut node = a;
        while node != TAX_NO_PARENT {
            nodes.insert(node);
            node = self.parent(node).ok_or(Error::UnknownTaxon(node))?;
        }
        node = b;
        while node != TAX_NO_PARENT {
            if nodes.contains(&node) {
                return Ok(node);
            }
            node = self.parent(node).ok_or_else(|| {
                warn!("Missing taxid {} while walking ancestor chain", node);
                Error::UnknownTaxon(node)
            })?;
        }
        Ok(TAX_ROOT)
    }

    fn can_add(&self) -> bool {
        (self.parent_map.len() as u64) < self.ceil as u64
    }

    /// Adds a named node under `parent`, assigning a fresh id by random
    /// probing of the id space. Fails with `CapacityExceeded` once the tree
    /// holds `ceiling` nodes, and with `IdSpaceExhausted` if no free id turns
    /// up within the probe budget.
    pub fn add_node(&mut self, name: &str, parent: TaxId) -> Result<TaxId> {
        if !self.can_add() {
            return Err(Error::CapacityExceeded {
                size: self.parent_map.len(),
                ceiling: self.ceil,
            });
        }
        debug_assert!(self.contains(TAX_ROOT));
        let mut rng = rand::rng();
        for _ in 0..MAX_ID_PROBES {
            let id: TaxId = rng.random();
            if id == TAX_NO_PARENT || id == TAX_UNKNOWN || self.contains(id) {
                continue;
            }
            self.add_node_impl(name, id, parent)?;
            return Ok(id);
        }
        Err(Error::IdSpaceExhausted(MAX_ID_PROBES))
    }

    /// Inserts a node with an explicit id. A duplicate id is fatal.
    pub fn add_node_impl(&mut self, name: &str, id: TaxId, parent: TaxId) -> Result<()> {
        if self.contains(id) {
            return Err(Error::DuplicateTaxonId(id));
        }
        self.parent_map.insert(id, parent);
        self.bind_name(name, id);
        Ok(())
    }

    /// Binds `name` to `id`. A name seen twice keeps its first binding and
    /// counts as a synonym.
    pub fn bind_name(&mut self, name: &str, id: TaxId) {
        if self.name_map.contains_key(name) {
            self.n_syn += 1;
        } else {
            self.name_map.insert(name.to_string(), id);
        }
    }

    /// Serialized layout, little endian, fixed order:
    /// name record count (`u64`), synonym count (`u64`), capacity ceiling
    /// (`u32`), then each name record as the name bytes terminated by `'\n'`
    /// followed by its `u32` id, then the parent map as a `u64` entry count
    /// followed by `(u32 child, u32 parent)` pairs.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_u64::<LittleEndian>(self.name_map.len() as u64)?;
        w.write_u64::<LittleEndian>(self.n_syn)?;
        w.write_u32::<LittleEndian>(self.ceil)?;
        for (name, &id) in &self.name_map {
            w.write_all(name.as_bytes())?;
            w.write_all(b"\n")?;
            w.write_u32::<LittleEndian>(id)?;
        }
        w.write_u64::<LittleEndian>(self.parent_map.len() as u64)?;
        for (&child, &parent) in &self.parent_map {
            w.write_u32::<LittleEndian>(child)?;
            w.write_u32::<LittleEndian>(parent)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_reader(BufReader::new(File::open(path)?))
    }

    fn load_reader<R: BufRead>(mut r: R) -> Result<Self> {
        let n_names = r.read_u64::<LittleEndian>()?;
        let n_syn = r.read_u64::<LittleEndian>()?;
        let mut ceil = r.read_u32::<LittleEndian>()?;

        let mut name_map = HashMap::with_capacity(n_names as usize);
        let mut buf = Vec::new();
        for _ in 0..n_names {
            buf.clear();
            r.read_until(b'\n', &mut buf)?;
            buf.pop();
            let name = String::from_utf8_lossy(&buf).into_owned();
            let id = r.read_u32::<LittleEndian>()?;
            name_map.insert(name, id);
        }

        let n_nodes = r.read_u64::<LittleEndian>()?;
        let mut parent_map = HashMap::with_capacity(n_nodes as usize);
        for _ in 0..n_nodes {
            let child = r.read_u32::<LittleEndian>()?;
            let parent = r.read_u32::<LittleEndian>()?;
            parent_map.insert(child, parent);
        }

        if ceil == 0 {
            ceil = (n_nodes as u32) * 2;
        }
        Ok(Self {
            parent_map,
            name_map,
            n_syn,
            ceil,
        })
    }
}
