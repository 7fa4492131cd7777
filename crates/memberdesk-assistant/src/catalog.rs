//! Tool catalog and per-message tool selection.
//!
//! The catalog is assembled once at startup through [`ToolCatalogBuilder`]
//! and is read-only afterwards, so it can be shared behind an `Arc` and read
//! from any number of sessions without locking.
//!
//! [`ToolCatalog::select`] narrows the full catalog to what one message needs:
//! a fixed core subset plus every topic cluster whose keywords occur in the
//! text.  Keyword matching is a single pass of an [`aho_corasick`] automaton
//! over the lowercased message.
//!
//! # Example
//!
//! ```rust
//! # use std::sync::Arc;
//! # use async_trait::async_trait;
//! # use memberdesk_assistant::catalog::*;
//! # use memberdesk_assistant::{ToolArguments, ToolError};
//! struct Count;
//!
//! #[async_trait]
//! impl ToolHandler for Count {
//!     async fn execute(&self, _args: ToolArguments) -> Result<serde_json::Value, ToolError> {
//!         Ok(serde_json::json!({"totalUsers": 42}))
//!     }
//! }
//!
//! let mut builder = ToolCatalogBuilder::new();
//! builder
//!     .register(ToolDescriptor::new("get_users_count", "Count members", ParameterSchema::empty(), Arc::new(Count)))
//!     .unwrap();
//! builder.core(["get_users_count"]);
//! let catalog = builder.build().unwrap();
//!
//! let selected = catalog.select("how many active members?");
//! assert_eq!(selected[0].name, "get_users_count");
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{AssistantError, Result, ToolError};
use crate::llm::types::{ToolArguments, ToolDefinition};

// ---------------------------------------------------------------------------
// Handler interface
// ---------------------------------------------------------------------------

/// The single-method contract every concrete tool implements.
///
/// Handlers live outside the orchestration core (document-store queries,
/// chart shaping, export jobs); the core only ever calls `execute`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with the model-supplied arguments.
    async fn execute(&self, arguments: ToolArguments) -> std::result::Result<Value, ToolError>;
}

// ---------------------------------------------------------------------------
// Parameter schema
// ---------------------------------------------------------------------------

/// The type of a single tool parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// A string restricted to the listed values.
    Enum(Vec<String>),
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterField {
    pub name: String,
    pub kind: ParameterKind,
    pub description: String,
    pub required: bool,
}

/// Ordered, typed parameter list of a tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub fields: Vec<ParameterField>,
}

impl ParameterSchema {
    /// A tool that takes no arguments.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder: add a required parameter.
    pub fn required(
        mut self,
        name: impl Into<String>,
        kind: ParameterKind,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(ParameterField {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        });
        self
    }

    /// Builder: add an optional parameter.
    pub fn optional(
        mut self,
        name: impl Into<String>,
        kind: ParameterKind,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(ParameterField {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        });
        self
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut prop = match &field.kind {
                ParameterKind::String => json!({"type": "string"}),
                ParameterKind::Integer => json!({"type": "integer"}),
                ParameterKind::Number => json!({"type": "number"}),
                ParameterKind::Boolean => json!({"type": "boolean"}),
                ParameterKind::Array => json!({"type": "array"}),
                ParameterKind::Object => json!({"type": "object"}),
                ParameterKind::Enum(values) => json!({"type": "string", "enum": values}),
            };
            if !field.description.is_empty() {
                prop["description"] = json!(field.description);
            }
            properties.insert(field.name.clone(), prop);
        }

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check that every required parameter is present and non-null.
    pub fn check_required(&self, arguments: &ToolArguments) -> std::result::Result<(), ToolError> {
        let missing: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .filter(|f| arguments.get(&f.name).is_none_or(Value::is_null))
            .map(|f| f.name.as_str())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments(format!(
                "missing required parameter(s): {}",
                missing.join(", ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptors and clusters
// ---------------------------------------------------------------------------

/// A callable tool: its advertised schema plus the handler that runs it.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Unique key.
    pub name: String,
    /// Shown to the model.
    pub description: String,
    /// Typed parameters.
    pub parameters: ParameterSchema,
    /// The external collaborator that executes the tool.
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Create a new descriptor.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }

    /// The wire definition advertised to the model.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.parameters.to_json_schema(),
        }
    }
}

/// A group of tools pulled in when any of its keywords appears in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCluster {
    pub name: String,
    pub keywords: Vec<String>,
    pub tools: Vec<String>,
}

impl TopicCluster {
    /// Create a cluster from string slices.
    pub fn new(name: &str, keywords: &[&str], tools: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            keywords: keywords.iter().map(|k| (*k).to_owned()).collect(),
            tools: tools.iter().map(|t| (*t).to_owned()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects descriptors, the core subset and the cluster table.
#[derive(Debug, Default)]
pub struct ToolCatalogBuilder {
    tools: Vec<Arc<ToolDescriptor>>,
    index: HashMap<String, usize>,
    core: Vec<String>,
    clusters: Vec<TopicCluster>,
}

impl ToolCatalogBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// [`AssistantError::DuplicateTool`] if the name is already taken.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<&mut Self> {
        if self.index.contains_key(&descriptor.name) {
            return Err(AssistantError::DuplicateTool {
                name: descriptor.name,
            });
        }
        tracing::debug!(tool = %descriptor.name, "tool registered");
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(Arc::new(descriptor));
        Ok(self)
    }

    /// Set the core subset, always included in every selection.
    pub fn core<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core = names.into_iter().map(Into::into).collect();
        self
    }

    /// Append a topic cluster.
    pub fn cluster(&mut self, cluster: TopicCluster) -> &mut Self {
        self.clusters.push(cluster);
        self
    }

    /// Validate and freeze the catalog.
    ///
    /// # Errors
    ///
    /// [`AssistantError::InvalidCatalog`] when the core subset is empty, a
    /// core or cluster entry names an unregistered tool, or a keyword is
    /// blank.
    pub fn build(self) -> Result<ToolCatalog> {
        if self.core.is_empty() {
            return Err(AssistantError::InvalidCatalog {
                reason: "core subset must not be empty".into(),
            });
        }

        let check = |name: &str, owner: &str| -> Result<usize> {
            self.index
                .get(name)
                .copied()
                .ok_or_else(|| AssistantError::InvalidCatalog {
                    reason: format!("{owner} references unregistered tool `{name}`"),
                })
        };

        let core = dedup_indices(
            self.core
                .iter()
                .map(|n| check(n, "core subset"))
                .collect::<Result<Vec<_>>>()?,
        );

        let mut clusters = Vec::with_capacity(self.clusters.len());
        let mut keywords: Vec<String> = Vec::new();
        let mut keyword_cluster: Vec<usize> = Vec::new();

        for (ci, cluster) in self.clusters.iter().enumerate() {
            let owner = format!("cluster `{}`", cluster.name);
            let tools = cluster
                .tools
                .iter()
                .map(|n| check(n, &owner))
                .collect::<Result<Vec<_>>>()?;

            for kw in &cluster.keywords {
                let kw = kw.trim().to_lowercase();
                if kw.is_empty() {
                    return Err(AssistantError::InvalidCatalog {
                        reason: format!("{owner} has a blank keyword"),
                    });
                }
                keywords.push(kw);
                keyword_cluster.push(ci);
            }

            clusters.push(CompiledCluster {
                name: cluster.name.clone(),
                tools,
            });
        }

        let matcher = if keywords.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::new(&keywords).map_err(|e| AssistantError::InvalidCatalog {
                    reason: format!("failed to build keyword automaton: {e}"),
                })?,
            )
        };

        tracing::info!(
            tools = self.tools.len(),
            core = core.len(),
            clusters = clusters.len(),
            keywords = keywords.len(),
            "tool catalog built"
        );

        Ok(ToolCatalog {
            tools: self.tools,
            index: self.index,
            core,
            clusters,
            matcher,
            keyword_cluster,
        })
    }
}

fn dedup_indices(indices: Vec<usize>) -> Vec<usize> {
    let mut seen = HashSet::new();
    indices.into_iter().filter(|i| seen.insert(*i)).collect()
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CompiledCluster {
    name: String,
    tools: Vec<usize>,
}

/// The immutable registry of callable tools.
pub struct ToolCatalog {
    tools: Vec<Arc<ToolDescriptor>>,
    index: HashMap<String, usize>,
    core: Vec<usize>,
    clusters: Vec<CompiledCluster>,
    matcher: Option<AhoCorasick>,
    /// Pattern id in `matcher` -> position in `clusters`.
    keyword_cluster: Vec<usize>,
}

impl fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.names())
            .field("clusters", &self.clusters)
            .finish_non_exhaustive()
    }
}

impl ToolCatalog {
    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the catalog has no tools (never true for a built catalog).
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Names of the core subset.
    pub fn core_names(&self) -> Vec<&str> {
        self.core.iter().map(|&i| self.tools[i].name.as_str()).collect()
    }

    /// Find a tool by name.
    ///
    /// # Errors
    ///
    /// [`AssistantError::UnknownTool`] if no tool has that name.
    pub fn lookup(&self, name: &str) -> Result<Arc<ToolDescriptor>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i]))
            .ok_or_else(|| AssistantError::UnknownTool {
                name: name.to_owned(),
            })
    }

    /// Names of the clusters whose keywords occur in `text`, in table order.
    pub fn matched_clusters(&self, text: &str) -> Vec<&str> {
        self.matched_cluster_ids(text)
            .into_iter()
            .map(|ci| self.clusters[ci].name.as_str())
            .collect()
    }

    fn matched_cluster_ids(&self, text: &str) -> Vec<usize> {
        let Some(matcher) = &self.matcher else {
            return Vec::new();
        };
        let lowered = text.to_lowercase();
        let mut hit = vec![false; self.clusters.len()];
        for mat in matcher.find_overlapping_iter(&lowered) {
            hit[self.keyword_cluster[mat.pattern().as_usize()]] = true;
        }
        hit.iter()
            .enumerate()
            .filter_map(|(ci, &h)| h.then_some(ci))
            .collect()
    }

    /// Narrow the catalog to the tools relevant for one message.
    ///
    /// Core tools first, then the tools of every matching cluster in table
    /// order, without duplicates.  Never empty.
    pub fn select(&self, text: &str) -> Vec<Arc<ToolDescriptor>> {
        let matched = self.matched_cluster_ids(text);

        let mut seen = HashSet::with_capacity(self.tools.len());
        let selected: Vec<Arc<ToolDescriptor>> = self
            .core
            .iter()
            .chain(matched.iter().flat_map(|&ci| self.clusters[ci].tools.iter()))
            .filter(|&&i| seen.insert(i))
            .map(|&i| Arc::clone(&self.tools[i]))
            .collect();

        let cluster_names: Vec<&str> = matched
            .iter()
            .map(|&ci| self.clusters[ci].name.as_str())
            .collect();
        tracing::debug!(selected = selected.len(), clusters = ?cluster_names, "tools selected");

        selected
    }

    /// Render descriptors into wire definitions.
    pub fn definitions(tools: &[Arc<ToolDescriptor>]) -> Vec<ToolDefinition> {
        tools.iter().map(|t| t.definition()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
