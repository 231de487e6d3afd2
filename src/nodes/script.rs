//! Script operator: runs a host-compiled script over its input.
//!
//! The compiled script is kept until the source parameter changes. Scripts
//! that depend on the element index run once per element; the rest run once
//! for the whole collection.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::cook::CookContext;
use crate::error::{CookError, CookResult};
use crate::geometry::{AttributeKind, ElementCollection};
use crate::graph::keys::P_SOURCE;
use crate::graph::{Cookable, DependencyKinds, DirtyReason, Params};
use crate::host::{CompiledScript, ScriptScope};

/// Elements between cancel checks in per-element mode
const CHECK_EVERY: usize = 256;

#[derive(Default)]
pub struct Script {
    compiled: Mutex<Option<(String, Arc<dyn CompiledScript>)>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&self, ctx: &CookContext<'_>, source: &str) -> CookResult<Arc<dyn CompiledScript>> {
        let mut slot = self.compiled.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((cached_source, script)) = slot.as_ref() {
            if cached_source == source {
                return Ok(Arc::clone(script));
            }
        }
        debug!("{}: compiling script", ctx.path());
        let script = ctx.host().compiler.compile(source)?;
        *slot = Some((source.to_string(), Arc::clone(&script)));
        Ok(script)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

impl Cookable for Script {
    fn type_tag(&self) -> &'static str {
        "Script"
    }

    fn default_params(&self) -> Params {
        Params::new().with(P_SOURCE, "")
    }

    fn cook(&self, ctx: &CookContext<'_>) -> CookResult<ElementCollection> {
        let source = ctx.params().get_str_or(P_SOURCE, "");
        if source.trim().is_empty() {
            return ctx.fetch_input(0);
        }
        let script = self.compiled(ctx, source)?;
        let mut collection = ctx.fetch_input(0)?;

        for name in script.reads() {
            collection.require_attribute(name)?;
        }
        for name in script.writes() {
            if collection.attribute(name).is_none() {
                collection.add_attribute(name, AttributeKind::Float)?;
            }
        }

        let time = if script.reads_time() { ctx.time() } else { 0.0 };
        let mut scope = ScriptScope {
            collection: &mut collection,
            time,
            params: ctx.params(),
        };
        if script.depends_on_index() {
            ctx.record(DependencyKinds::ELEMENT_INDEX);
            for index in 0..scope.collection.len() {
                if index % CHECK_EVERY == 0 {
                    ctx.checkpoint()?;
                }
                script.call(&mut scope, Some(index)).map_err(CookError::Node)?;
            }
        } else {
            script.call(&mut scope, None).map_err(CookError::Node)?;
        }
        Ok(collection)
    }

    fn invalidate(&self, reason: DirtyReason) {
        if reason == DirtyReason::Params {
            *self.compiled.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::keys::{P_COLS, P_ROWS};
    use crate::graph::{CookStatus, Node, NodeKind, NodePath, mark_dirty};
    use crate::host::{CompileError, ScriptCompiler};
    use crate::nodes::Grid;
    use crate::nodes::testing::{add, connect, cook_at, host};

    /// `scale <attr> <factor>`: per-element multiply of a float column.
    /// `stamp <attr>`: writes the cook time into every element, once per collection.
    /// `boom`: runtime failure.
    struct TinyScript {
        attrs: Vec<String>,
        factor: f32,
        per_element: bool,
        fail: bool,
    }

    impl CompiledScript for TinyScript {
        fn reads(&self) -> &[String] {
            if self.per_element { self.attrs.as_slice() } else { &[] }
        }

        fn writes(&self) -> &[String] {
            &self.attrs
        }

        fn depends_on_index(&self) -> bool {
            self.per_element
        }

        fn call(&self, scope: &mut ScriptScope<'_>, index: Option<usize>) -> Result<(), String> {
            if self.fail {
                return Err("boom".into());
            }
            let column = scope
                .collection
                .attribute_mut(&self.attrs[0])
                .ok_or("missing column")?;
            match index {
                Some(i) => {
                    let v = column.get_float(i).map_err(|e| e.to_string())?;
                    column.set_float(i, v * self.factor).map_err(|e| e.to_string())
                }
                None => {
                    for i in 0..column.len() {
                        column.set_float(i, scope.time as f32).map_err(|e| e.to_string())?;
                    }
                    Ok(())
                }
            }
        }
    }

    struct TinyCompiler;

    impl ScriptCompiler for TinyCompiler {
        fn compile(&self, source: &str) -> Result<Arc<dyn CompiledScript>, CompileError> {
            let words: Vec<&str> = source.split_whitespace().collect();
            let script = match words.as_slice() {
                ["scale", attr, factor] => TinyScript {
                    attrs: vec![attr.to_string()],
                    factor: factor.parse().map_err(|_| CompileError::new("bad factor").at(1, 3))?,
                    per_element: true,
                    fail: false,
                },
                ["stamp", attr] => TinyScript {
                    attrs: vec![attr.to_string()],
                    factor: 1.0,
                    per_element: false,
                    fail: false,
                },
                ["boom"] => TinyScript {
                    attrs: vec![],
                    factor: 1.0,
                    per_element: false,
                    fail: true,
                },
                _ => return Err(CompileError::new("unknown statement").at(1, 1)),
            };
            Ok(Arc::new(script))
        }
    }

    fn graph(source: &str) -> Node {
        let mut root = Node::root();
        let g = add(
            &mut root,
            Node::new("grid", Grid::new()).with_params(Params::new().with(P_ROWS, 1).with(P_COLS, 3)),
        );
        let s = add(
            &mut root,
            Node::new("script", Script::new()).with_params(Params::new().with(P_SOURCE, source)),
        );
        connect(&mut root, g, s, 0);
        root
    }

    fn script_node<'a>(root: &'a Node) -> &'a Node {
        root.find(&NodePath::parse("/script")).unwrap()
    }

    #[test]
    fn test_once_per_collection_creates_written_column() {
        let root = graph("stamp t");
        let host = host().with_compiler(Arc::new(TinyCompiler));
        let out = cook_at(&root, &host, "/script", 40.0).collection.unwrap();

        let column = out.attribute("t").unwrap();
        assert_eq!(column.kind(), AttributeKind::Float);
        assert_eq!(column.get_float(2).unwrap(), 40.0);
        let node = script_node(&root);
        assert!(node.kinds().contains(DependencyKinds::TIME));
        assert!(!node.kinds().contains(DependencyKinds::ELEMENT_INDEX));
    }

    #[test]
    fn test_per_element_requires_read_columns() {
        let root = graph("scale weight 2");
        let host = host().with_compiler(Arc::new(TinyCompiler));
        let report = cook_at(&root, &host, "/script", 0.0);
        assert!(matches!(
            report.outcome,
            crate::cook::JobOutcome::Failed(CookError::Attribute(_))
        ));
        assert_eq!(script_node(&root).status(), CookStatus::Error);
    }

    #[test]
    fn test_compile_error_and_recompile_on_edit() {
        let mut root = graph("scale weight x");
        let host = host().with_compiler(Arc::new(TinyCompiler));
        let report = cook_at(&root, &host, "/script", 0.0);
        assert_eq!(
            report.outcome,
            crate::cook::JobOutcome::Failed(CookError::Compile {
                message: "bad factor".into(),
                line: Some(1),
                column: Some(3),
            })
        );

        let path = NodePath::parse("/script");
        root.find_mut(&path)
            .unwrap()
            .params_mut()
            .set(P_SOURCE, "boom");
        mark_dirty(&root, &path, DirtyReason::Params);
        let report = cook_at(&root, &host, "/script", 0.0);
        assert_eq!(report.outcome, crate::cook::JobOutcome::Failed(CookError::node("boom")));
        let NodeKind::Script(script) = script_node(&root).kind() else {
            panic!("not a script node");
        };
        assert!(script.is_compiled());
        script.invalidate(DirtyReason::Params);
        assert!(!script.is_compiled());
    }

    #[test]
    fn test_empty_source_passes_through() {
        let root = graph("");
        let host = host();
        let out = cook_at(&root, &host, "/script", 0.0).collection.unwrap();
        assert_eq!(out.len(), 3);
    }
}
