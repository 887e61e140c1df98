use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasourceMeta {
    pub id: String,
    pub name: String,
    pub catalog_name: String,
    pub schema_name: String,
}

/// 视图类型决定其物理位置的命名方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Datasource,
    Custom,
    LogicEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewMeta {
    pub id: String,
    pub technical_name: String,
    pub business_name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ViewKind,
    pub datasource_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldMeta {
    pub id: String,
    pub view_id: String,
    pub technical_name: String,
    pub business_name: String,
    pub data_type: String,
    pub length: Option<i32>,
    pub precision: Option<i32>,
    #[serde(default)]
    pub description: String,
    pub standard_id: Option<String>,
    pub code_table_id: Option<String>,
    pub subject_id: Option<String>,
    pub grade_label_id: Option<String>,
}

/// 字段类型的大类，用于空值判定等类型敏感的规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Character,
    Numeric,
    Temporal,
    Other,
}

impl TypeFamily {
    pub fn of(data_type: &str) -> Self {
        let base = data_type
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match base.as_str() {
            "char" | "varchar" | "string" | "text" | "nchar" | "nvarchar" | "character"
            | "character varying" | "longtext" | "mediumtext" | "clob" => TypeFamily::Character,
            "tinyint" | "smallint" | "int" | "integer" | "bigint" | "decimal" | "numeric"
            | "number" | "float" | "double" | "real" | "double precision" => TypeFamily::Numeric,
            "date" | "time" | "datetime" | "timestamp" | "timestamp with time zone"
            | "timestamp without time zone" => TypeFamily::Temporal,
            _ => TypeFamily::Other,
        }
    }
}

impl FieldMeta {
    pub fn type_family(&self) -> TypeFamily {
        TypeFamily::of(&self.data_type)
    }

    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

/// 数据标准的声明信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardInfo {
    pub id: String,
    pub data_type: String,
    pub length: Option<i32>,
    pub precision: Option<i32>,
    pub code_rule_id: Option<String>,
    pub dict_id: Option<String>,
}

impl StandardInfo {
    /// 字段声明的类型、长度、精度是否与标准一致
    pub fn matches_field(&self, field: &FieldMeta) -> bool {
        self.data_type.eq_ignore_ascii_case(field.data_type.trim())
            && self.length == field.length
            && self.precision == field.precision
    }
}

/// 分类助手返回的字段主题匹配结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSubjectMatch {
    pub field_id: String,
    pub subject_id: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_family() {
        assert_eq!(TypeFamily::of("VARCHAR(255)"), TypeFamily::Character);
        assert_eq!(TypeFamily::of("bigint"), TypeFamily::Numeric);
        assert_eq!(TypeFamily::of("decimal(10,2)"), TypeFamily::Numeric);
        assert_eq!(TypeFamily::of("timestamp"), TypeFamily::Temporal);
        assert_eq!(TypeFamily::of("boolean"), TypeFamily::Other);
    }
}
