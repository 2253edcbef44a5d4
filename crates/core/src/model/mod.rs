//! Source model: what schema files, test files and importers produce.
//!
//! Nothing in here is mutated once the scan finishes. Derived data (merged
//! `_extends` types, examples) lives in [`crate::resolved`].

mod field;
mod schema;

pub use field::{Encoding, FieldDef, FieldShape, TypeBody, TypeShape};
pub use schema::{
    ApiGroup, ConfigOption, Example, GenerateRpc, HttpBinding, OpenApiSource, RpcFunctionDef,
    SchemaFile, SolidityBinding, SoliditySource, TestCase, TestFile,
};

use crate::error::{GenError, Result};

/// Build progress of one RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    /// Declared or imported.
    Discovered,
    /// Every param and the result resolved to a primitive or a registered type.
    ParamsResolved,
    /// Alias, collision and dispatch checks passed.
    Validated,
    /// At least one backend produced output for it.
    Emitted,
}

impl BuildStage {
    /// Move to `next`, which must be the immediate successor. `Emitted -> Emitted` is allowed.
    pub fn advance(self, next: BuildStage, method: &str) -> Result<BuildStage> {
        let ok = matches!(
            (self, next),
            (BuildStage::Discovered, BuildStage::ParamsResolved)
                | (BuildStage::ParamsResolved, BuildStage::Validated)
                | (BuildStage::Validated | BuildStage::Emitted, BuildStage::Emitted)
        );
        if ok {
            Ok(next)
        } else {
            Err(GenError::StageOrder {
                method: method.to_string(),
                from: self,
                to: next,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_advances_in_order() {
        let s = BuildStage::Discovered;
        let s = s.advance(BuildStage::ParamsResolved, "m").unwrap();
        let s = s.advance(BuildStage::Validated, "m").unwrap();
        let s = s.advance(BuildStage::Emitted, "m").unwrap();
        assert_eq!(s.advance(BuildStage::Emitted, "m").unwrap(), BuildStage::Emitted);
    }

    #[test]
    fn test_stage_rejects_skips() {
        assert!(BuildStage::Discovered.advance(BuildStage::Validated, "m").is_err());
        assert!(BuildStage::Validated.advance(BuildStage::ParamsResolved, "m").is_err());
    }
}
