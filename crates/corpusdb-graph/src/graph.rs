//! The corpus image.
//!
//! [`AnnotationGraph`] holds everything a query runs against: the string
//! pool, the node-annotation storage and one graph storage per edge
//! component. The image is immutable during query execution; mutation goes
//! through [`AnnotationGraph::apply_update`] or the writable storage
//! handles, both used only while no query holds the image.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use corpusdb_core::{
    AnnoKey, AnnoStorage, Annotation, Component, ComponentType, NodeId, StringId, StringPool,
    ANNIS_NS, DOCUMENT, NODE_NAME, NODE_TYPE, TOK,
};

use crate::error::{GraphError, GraphResult};
use crate::registry;
use crate::storage::{GraphStorage, WriteableGraphStorage};
use crate::update::{GraphUpdate, UpdateEvent};

const STRINGS_FILE: &str = "strings.bin";
const NODE_ANNOS_FILE: &str = "node_annos.bin";
const GS_DIR: &str = "gs";
const IMPL_FILE: &str = "impl.cfg";
const DATA_FILE: &str = "data.bin";

/// An in-memory corpus: string pool, node annotations and one storage per
/// edge component.
pub struct AnnotationGraph {
    strings: StringPool,
    node_annos: AnnoStorage<NodeId>,
    components: BTreeMap<Component, Arc<dyn GraphStorage>>,

    id_annis_ns: StringId,
    id_node_name: StringId,
    id_tok: StringId,
    id_node_type: StringId,
    id_document: StringId,
}

impl Default for AnnotationGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationGraph {
    /// Creates an empty corpus image with the reserved strings resolved.
    #[must_use]
    pub fn new() -> Self {
        let mut strings = StringPool::new();
        Self {
            id_annis_ns: strings.add(ANNIS_NS),
            id_node_name: strings.add(NODE_NAME),
            id_tok: strings.add(TOK),
            id_node_type: strings.add(NODE_TYPE),
            id_document: strings.add(DOCUMENT),
            strings,
            node_annos: AnnoStorage::new(),
            components: BTreeMap::new(),
        }
    }

    /// The string pool.
    #[must_use]
    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    /// Mutable access to the string pool, for corpus construction.
    pub fn strings_mut(&mut self) -> &mut StringPool {
        &mut self.strings
    }

    /// The node-annotation storage.
    #[must_use]
    pub fn node_annos(&self) -> &AnnoStorage<NodeId> {
        &self.node_annos
    }

    /// Mutable access to the node annotations, for corpus construction.
    pub fn node_annos_mut(&mut self) -> &mut AnnoStorage<NodeId> {
        &mut self.node_annos
    }

    /// The id of the reserved `annis` namespace.
    #[must_use]
    pub fn annis_ns_id(&self) -> StringId {
        self.id_annis_ns
    }

    /// The reserved `annis::tok` key.
    #[must_use]
    pub fn token_key(&self) -> AnnoKey {
        AnnoKey { name: self.id_tok, ns: self.id_annis_ns }
    }

    /// The reserved `annis::node_name` key.
    #[must_use]
    pub fn node_name_key(&self) -> AnnoKey {
        AnnoKey { name: self.id_node_name, ns: self.id_annis_ns }
    }

    /// The reserved `annis::node_type` key.
    #[must_use]
    pub fn node_type_key(&self) -> AnnoKey {
        AnnoKey { name: self.id_node_type, ns: self.id_annis_ns }
    }

    /// The reserved `annis::document` key.
    #[must_use]
    pub fn document_key(&self) -> AnnoKey {
        AnnoKey { name: self.id_document, ns: self.id_annis_ns }
    }

    /// All nodes of the corpus, i.e. every node carrying the reserved
    /// `annis::node_name` annotation.
    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_annos
            .exact_anno_search(Some(self.id_annis_ns), self.id_node_name, None)
            .map(|m| m.node)
    }

    /// Registers a node under the given name.
    pub fn add_node(&mut self, node: NodeId, name: &str) {
        let name_id = self.strings.add(name);
        let node_val = self.strings.add("node");
        let key = self.node_name_key();
        self.node_annos.insert(node, Annotation { key, val: name_id });
        let key = self.node_type_key();
        self.node_annos.insert(node, Annotation { key, val: node_val });
    }

    /// Annotates a node, interning all three strings.
    pub fn add_node_annotation(&mut self, node: NodeId, ns: &str, name: &str, value: &str) {
        let anno = Annotation {
            key: AnnoKey { name: self.strings.add(name), ns: self.strings.add(ns) },
            val: self.strings.add(value),
        };
        self.node_annos.insert(node, anno);
    }

    /// Looks a node up by its `annis::node_name`.
    #[must_use]
    pub fn node_id_by_name(&self, name: &str) -> Option<NodeId> {
        let name_id = self.strings.find_id(name)?;
        self.node_annos
            .exact_anno_search(Some(self.id_annis_ns), self.id_node_name, Some(name_id))
            .next()
            .map(|m| m.node)
    }

    /// The storage of a component, if the component exists.
    #[must_use]
    pub fn get_graphstorage(&self, component: &Component) -> Option<Arc<dyn GraphStorage>> {
        self.components.get(component).cloned()
    }

    /// All component identifiers, optionally filtered by type, layer and
    /// name.
    #[must_use]
    pub fn get_all_components(
        &self,
        ctype: Option<ComponentType>,
        layer: Option<&str>,
        name: Option<&str>,
    ) -> Vec<Component> {
        self.components
            .keys()
            .filter(|c| ctype.map_or(true, |t| c.ctype == t))
            .filter(|c| layer.map_or(true, |l| c.layer == l))
            .filter(|c| name.map_or(true, |n| c.name == n))
            .cloned()
            .collect()
    }

    /// A writable handle for a component, creating the component or
    /// converting it to the writable representation if necessary.
    pub fn get_or_create_writable(
        &mut self,
        component: &Component,
    ) -> GraphResult<&mut dyn WriteableGraphStorage> {
        // decide first, mutate afterwards, so no borrow of the component
        // map is live while it is replaced
        let to_copy: Option<Option<Arc<dyn GraphStorage>>> = match self.components.get(component) {
            None => Some(None),
            Some(existing)
                if existing.serialization_id() != registry::ADJACENCY
                    || Arc::strong_count(existing) > 1 =>
            {
                Some(Some(Arc::clone(existing)))
            }
            Some(_) => None,
        };
        match to_copy {
            Some(None) => {
                self.components
                    .insert(component.clone(), Arc::new(registry::create_writeable()));
            }
            Some(Some(orig)) => {
                let copy = registry::create_copy(self, registry::ADJACENCY, orig.as_ref())?;
                self.components.insert(component.clone(), copy);
            }
            None => {}
        }

        let arc = self
            .components
            .get_mut(component)
            .ok_or_else(|| GraphError::NotWritable(component.to_string()))?;
        Arc::get_mut(arc)
            .and_then(|gs| gs.as_writeable())
            .ok_or_else(|| GraphError::NotWritable(component.to_string()))
    }

    /// Recomputes the statistics of the node annotations and of every
    /// component that is in its writable representation.
    pub fn calculate_all_statistics(&mut self) {
        self.node_annos.calculate_statistics(&self.strings);

        let keys: Vec<Component> = self.components.keys().cloned().collect();
        for component in keys {
            if let Some(arc) = self.components.get_mut(&component) {
                if let Some(writable) = Arc::get_mut(arc).and_then(|gs| gs.as_writeable()) {
                    writable.calculate_statistics();
                }
            }
        }
    }

    /// Re-selects the representation of every component from its
    /// statistics.
    ///
    /// `overrides` pins single components to a named implementation;
    /// `force_fallback` converts everything to the adjacency fallback.
    pub fn optimize_impl(
        &mut self,
        overrides: &BTreeMap<Component, String>,
        force_fallback: bool,
    ) -> GraphResult<()> {
        let keys: Vec<Component> = self.components.keys().cloned().collect();
        for component in keys {
            let Some(orig) = self.components.get(&component).cloned() else {
                continue;
            };
            let desired: &str = if force_fallback {
                registry::ADJACENCY
            } else if let Some(name) = overrides.get(&component) {
                name.as_str()
            } else {
                registry::get_optimized_impl(&component, orig.get_statistics())
            };

            if orig.serialization_id() != desired {
                let converted = registry::create_copy(self, desired, orig.as_ref())?;
                debug!(
                    component = %component,
                    from = orig.serialization_id(),
                    to = desired,
                    "converted component storage"
                );
                self.components.insert(component, converted);
            }
        }
        Ok(())
    }

    /// Applies an update log in order.
    pub fn apply_update(&mut self, update: &GraphUpdate) -> GraphResult<()> {
        for event in update.iter() {
            match event {
                UpdateEvent::AddNode { node_name } => {
                    if self.node_id_by_name(node_name).is_none() {
                        let id = self.node_annos.next_free_node_id();
                        self.add_node(id, node_name);
                    }
                }
                UpdateEvent::DeleteNode { node_name } => {
                    if let Some(id) = self.node_id_by_name(node_name) {
                        for anno in self.node_annos.get_all(&id).to_vec() {
                            self.node_annos.remove(&id, &anno.key);
                        }
                        let components: Vec<Component> =
                            self.components.keys().cloned().collect();
                        for c in components {
                            self.get_or_create_writable(&c)?.delete_node(id);
                        }
                    }
                }
                UpdateEvent::AddNodeLabel { node_name, anno_ns, anno_name, anno_value } => {
                    if let Some(id) = self.node_id_by_name(node_name) {
                        self.add_node_annotation(id, anno_ns, anno_name, anno_value);
                    }
                }
                UpdateEvent::DeleteNodeLabel { node_name, anno_ns, anno_name } => {
                    if let Some(id) = self.node_id_by_name(node_name) {
                        if let (Some(ns), Some(name)) =
                            (self.strings.find_id(anno_ns), self.strings.find_id(anno_name))
                        {
                            self.node_annos.remove(&id, &AnnoKey { name, ns });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Byte-level estimate of the heap memory held by the whole image.
    #[must_use]
    pub fn estimated_memory_size(&self) -> usize {
        self.strings.estimated_memory_size()
            + self.node_annos.estimated_memory_size()
            + self
                .components
                .values()
                .map(|gs| gs.estimated_memory_size())
                .sum::<usize>()
    }

    fn component_path(base: &Path, component: &Component) -> PathBuf {
        let mut path = base.join(GS_DIR).join(component.ctype.as_str()).join(&component.layer);
        if !component.name.is_empty() {
            path = path.join(&component.name);
        }
        path
    }

    /// Writes a snapshot of the image.
    ///
    /// One file each for the string pool and the node annotations, and one
    /// directory per component holding a manifest (`impl.cfg`) naming the
    /// back-end plus its serialized data. The output is deterministic for
    /// the same in-memory state.
    pub fn save_to(&self, location: &Path) -> GraphResult<()> {
        std::fs::create_dir_all(location)?;

        let writer = BufWriter::new(File::create(location.join(STRINGS_FILE))?);
        bincode::serialize_into(writer, &self.strings)?;

        let writer = BufWriter::new(File::create(location.join(NODE_ANNOS_FILE))?);
        bincode::serialize_into(writer, &self.node_annos)?;

        for (component, gs) in &self.components {
            let component_dir = Self::component_path(location, component);
            std::fs::create_dir_all(&component_dir)?;

            let mut manifest = File::create(component_dir.join(IMPL_FILE))?;
            manifest.write_all(gs.serialization_id().as_bytes())?;

            let mut writer = BufWriter::new(File::create(component_dir.join(DATA_FILE))?);
            gs.save_data(&mut writer)?;
        }

        debug!(location = %location.display(), components = self.components.len(), "saved corpus image");
        Ok(())
    }

    /// Loads a snapshot written by [`save_to`](Self::save_to).
    pub fn load_from(location: &Path) -> GraphResult<Self> {
        let mut graph = Self::new();

        let reader = BufReader::new(File::open(location.join(STRINGS_FILE)).map_err(|e| {
            GraphError::CorpusCorrupt(format!("missing {STRINGS_FILE}: {e}"))
        })?);
        graph.strings = bincode::deserialize_from(reader)?;

        let reader = BufReader::new(File::open(location.join(NODE_ANNOS_FILE)).map_err(|e| {
            GraphError::CorpusCorrupt(format!("missing {NODE_ANNOS_FILE}: {e}"))
        })?);
        graph.node_annos = bincode::deserialize_from(reader)?;

        // re-resolve the reserved ids against the loaded pool
        graph.id_annis_ns = graph.strings.add(ANNIS_NS);
        graph.id_node_name = graph.strings.add(NODE_NAME);
        graph.id_tok = graph.strings.add(TOK);
        graph.id_node_type = graph.strings.add(NODE_TYPE);
        graph.id_document = graph.strings.add(DOCUMENT);

        let gs_dir = location.join(GS_DIR);
        for ctype in ComponentType::ALL {
            let type_dir = gs_dir.join(ctype.as_str());
            if !type_dir.is_dir() {
                continue;
            }
            for layer_entry in std::fs::read_dir(&type_dir)? {
                let layer_dir = layer_entry?.path();
                if !layer_dir.is_dir() {
                    continue;
                }
                let layer = path_name(&layer_dir)?;

                if layer_dir.join(IMPL_FILE).is_file() {
                    let component = Component::new(ctype, layer.clone(), "");
                    let gs = load_component(&layer_dir)?;
                    graph.components.insert(component, gs);
                }
                for name_entry in std::fs::read_dir(&layer_dir)? {
                    let name_dir = name_entry?.path();
                    if name_dir.is_dir() && name_dir.join(IMPL_FILE).is_file() {
                        let component = Component::new(ctype, layer.clone(), path_name(&name_dir)?);
                        let gs = load_component(&name_dir)?;
                        graph.components.insert(component, gs);
                    }
                }
            }
        }

        debug!(location = %location.display(), components = graph.components.len(), "loaded corpus image");
        Ok(graph)
    }
}

fn path_name(path: &Path) -> GraphResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| GraphError::CorpusCorrupt(format!("invalid path {}", path.display())))
}

fn load_component(dir: &Path) -> GraphResult<Arc<dyn GraphStorage>> {
    let mut impl_name = String::new();
    File::open(dir.join(IMPL_FILE))
        .map_err(|e| GraphError::CorpusCorrupt(format!("missing {IMPL_FILE} in {}: {e}", dir.display())))?
        .read_to_string(&mut impl_name)?;

    let data = File::open(dir.join(DATA_FILE))
        .map_err(|e| GraphError::CorpusCorrupt(format!("missing {DATA_FILE} in {}: {e}", dir.display())))?;
    let mut reader = BufReader::new(data);
    registry::load_by_name(impl_name.trim(), &mut reader)
}
