//! Typed registry of capture points within a backend
//!
//! Layer names are resolved exactly once, when the caller configures an
//! invocation; the pipeline itself only ever sees a [`LayerId`]. An
//! unknown name fails fast with `InvalidArgument` instead of surfacing
//! deep inside a forward pass.

use anyhow::Result;

use crate::error::ExplainError;

/// Opaque handle to one capture point, valid for the registry (and thus
/// the backend) that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    /// Positional index of the capture point within its backend.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Ordered set of named capture points, built once at model-load time.
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    names: Vec<String>,
    default: usize,
}

impl LayerRegistry {
    /// Build a registry from capture-point names. The default layer is the
    /// last one — for a CNN classifier that is the deepest conv block,
    /// which is where class-discriminative spatial evidence lives.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(ExplainError::invalid("layer registry has no capture points"));
        }
        let default = names.len() - 1;
        Ok(Self { names, default })
    }

    /// Resolve a layer name to its typed handle.
    pub fn resolve(&self, name: &str) -> Result<LayerId> {
        match self.names.iter().position(|n| n == name) {
            Some(idx) => Ok(LayerId(idx)),
            None => Err(ExplainError::invalid(format!(
                "unknown layer '{}', available: {}",
                name,
                self.names.join(", ")
            ))),
        }
    }

    /// Default capture point (the deepest one).
    pub fn default_layer(&self) -> LayerId {
        LayerId(self.default)
    }

    /// Name of a capture point.
    pub fn name(&self, id: LayerId) -> &str {
        &self.names[id.0]
    }

    /// All capture-point names, in depth order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of capture points.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the registry is empty (never true for a constructed one).
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LayerRegistry {
        LayerRegistry::new(vec![
            "block1".to_string(),
            "block2".to_string(),
            "block3".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_known() {
        let reg = registry();
        assert_eq!(reg.resolve("block2").unwrap(), LayerId(1));
        assert_eq!(reg.name(LayerId(1)), "block2");
    }

    #[test]
    fn test_resolve_unknown_fails_fast() {
        let reg = registry();
        let err = reg.resolve("block9").unwrap_err();
        let cat = err.downcast_ref::<ExplainError>().unwrap();
        assert!(matches!(cat, ExplainError::InvalidArgument(_)));
        assert!(err.to_string().contains("block1, block2, block3"));
    }

    #[test]
    fn test_default_is_deepest() {
        let reg = registry();
        assert_eq!(reg.default_layer(), LayerId(2));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(LayerRegistry::new(vec![]).is_err());
    }
}
