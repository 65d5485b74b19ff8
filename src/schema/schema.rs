use serde::{Deserialize, Serialize};

use crate::core::types::DataType;

/// Role of a column in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Dimension,
    Metric,
    Time,
}

/// Column definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub data_type: DataType,
    pub field_type: FieldType,
    pub single_value: bool,
    /// Name of the registered provider for columns the segment does not store
    pub virtual_column_provider: Option<String>,
}

impl FieldSpec {
    pub fn is_virtual(&self) -> bool {
        self.virtual_column_provider.is_some()
    }
}

/// Ordered set of columns with a distinguished optional time column
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub field_specs: Vec<FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Schema {
            field_specs: Vec::new(),
        }
    }

    pub fn add_dimension(mut self, name: &str, data_type: DataType) -> Self {
        self.push(name, data_type, FieldType::Dimension, true);
        self
    }

    pub fn add_multi_value_dimension(mut self, name: &str, data_type: DataType) -> Self {
        self.push(name, data_type, FieldType::Dimension, false);
        self
    }

    pub fn add_metric(mut self, name: &str, data_type: DataType) -> Self {
        self.push(name, data_type, FieldType::Metric, true);
        self
    }

    pub fn add_time(mut self, name: &str, data_type: DataType) -> Self {
        self.push(name, data_type, FieldType::Time, true);
        self
    }

    pub fn add_virtual(mut self, name: &str, data_type: DataType, provider: &str) -> Self {
        self.field_specs.push(FieldSpec {
            name: name.to_string(),
            data_type,
            field_type: FieldType::Dimension,
            single_value: true,
            virtual_column_provider: Some(provider.to_string()),
        });
        self
    }

    fn push(&mut self, name: &str, data_type: DataType, field_type: FieldType, single_value: bool) {
        self.field_specs.push(FieldSpec {
            name: name.to_string(),
            data_type,
            field_type,
            single_value,
            virtual_column_provider: None,
        });
    }

    pub fn all_field_specs(&self) -> &[FieldSpec] {
        &self.field_specs
    }

    pub fn field_spec_for(&self, column: &str) -> Option<&FieldSpec> {
        self.field_specs.iter().find(|f| f.name == column)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.field_specs.iter().map(|f| f.name.clone()).collect()
    }

    /// Physical columns only (virtual columns are not stored by the segment)
    pub fn physical_column_names(&self) -> Vec<String> {
        self.field_specs
            .iter()
            .filter(|f| !f.is_virtual())
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn is_virtual_column(&self, column: &str) -> bool {
        self.field_spec_for(column)
            .map(|f| f.is_virtual())
            .unwrap_or(false)
    }

    pub fn dimension_names(&self) -> Vec<String> {
        self.field_specs
            .iter()
            .filter(|f| f.field_type == FieldType::Dimension && !f.is_virtual())
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.field_specs
            .iter()
            .filter(|f| f.field_type == FieldType::Metric)
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn metric_field_specs(&self) -> Vec<&FieldSpec> {
        self.field_specs
            .iter()
            .filter(|f| f.field_type == FieldType::Metric)
            .collect()
    }

    pub fn time_column_name(&self) -> Option<&str> {
        self.field_specs
            .iter()
            .find(|f| f.field_type == FieldType::Time)
            .map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_accessors() {
        let schema = Schema::new()
            .add_dimension("dim", DataType::String)
            .add_multi_value_dimension("tags", DataType::Int)
            .add_metric("metric", DataType::Long)
            .add_time("time", DataType::Long)
            .add_virtual("$docId", DataType::Int, "docId");

        assert_eq!(schema.dimension_names(), vec!["dim", "tags"]);
        assert_eq!(schema.metric_names(), vec!["metric"]);
        assert_eq!(schema.time_column_name(), Some("time"));
        assert!(schema.is_virtual_column("$docId"));
        assert_eq!(schema.physical_column_names().len(), 4);
        assert!(!schema.field_spec_for("tags").unwrap().single_value);
    }
}
