use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 非数据源视图在查询引擎中的物理位置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub custom_catalog: String,
    pub custom_schema: String,
    pub logic_entity_catalog: String,
    pub logic_entity_schema: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            custom_catalog: "vdm".to_string(),
            custom_schema: "custom_view_source".to_string(),
            logic_entity_catalog: "vdm".to_string(),
            logic_entity_schema: "logic_entity_view_source".to_string(),
        }
    }
}

impl ConfigValidator for ResolverConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.custom_catalog, "resolver.custom_catalog")?;
        ValidationUtils::validate_not_empty(&self.custom_schema, "resolver.custom_schema")?;
        ValidationUtils::validate_not_empty(&self.logic_entity_catalog, "resolver.logic_entity_catalog")?;
        ValidationUtils::validate_not_empty(&self.logic_entity_schema, "resolver.logic_entity_schema")?;
        Ok(())
    }
}
