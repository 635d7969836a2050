use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    arguments::ResolvedArgs,
    context::Context,
    datasources::{DataSource, Instruction},
    error::DataSourceError,
};

/// Flat type lookup table handed over at gateway setup. The engine treats
/// it as opaque data; whatever builds it owns schema semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaTypes {
    types: HashMap<String, TypeDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    pub fields: Vec<TypeFieldDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeFieldDefinition {
    pub name: String,
    pub type_name: String,
}

impl SchemaTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, definition: TypeDefinition) {
        self.types.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }
}

/// Answers `__type` lookups with a canned introspection document:
/// `{"__type":{"name":…,"fields":[{"name":…,"type":{"name":…}}]}}`.
pub struct TypeDataSource {
    schema: Arc<SchemaTypes>,
}

impl TypeDataSource {
    pub fn new(schema: Arc<SchemaTypes>) -> Self {
        TypeDataSource { schema }
    }
}

#[derive(Serialize)]
struct TypeEnvelope<'a> {
    #[serde(rename = "__type")]
    type_document: Option<TypeDocument<'a>>,
}

#[derive(Serialize)]
struct TypeDocument<'a> {
    name: &'a str,
    fields: Vec<FieldDocument<'a>>,
}

#[derive(Serialize)]
struct FieldDocument<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    field_type: NamedTypeDocument<'a>,
}

#[derive(Serialize)]
struct NamedTypeDocument<'a> {
    name: &'a str,
}

#[async_trait]
impl DataSource for TypeDataSource {
    async fn resolve(
        &self,
        _ctx: &Context,
        args: &ResolvedArgs,
        out: &mut Vec<u8>,
    ) -> Result<Instruction, DataSourceError> {
        let name = args
            .by_key(b"name")
            .ok_or(DataSourceError::MissingArgument("name"))?;
        let name = String::from_utf8_lossy(name);

        let envelope = TypeEnvelope {
            type_document: self.schema.get(&name).map(|definition| TypeDocument {
                name: &definition.name,
                fields: definition
                    .fields
                    .iter()
                    .map(|field| FieldDocument {
                        name: &field.name,
                        field_type: NamedTypeDocument {
                            name: &field.type_name,
                        },
                    })
                    .collect(),
            }),
        };
        let document = sonic_rs::to_vec(&envelope)
            .map_err(|error| DataSourceError::InvalidArgument("name", error.to_string()))?;
        out.extend_from_slice(&document);
        Ok(Instruction::CloseConnectionIfNotStream)
    }
}
