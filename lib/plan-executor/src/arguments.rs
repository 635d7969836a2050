use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{context::Context, json_writer, projection, template};

/// Declarative argument attached to a data source invocation. Arguments are
/// resolved in declaration order into a flat key/value list before the data
/// source runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Argument {
    Static(StaticVariableArgument),
    Context(ContextVariableArgument),
    Object(ObjectVariableArgument),
    List(ListArgument),
}

/// A literal value. The value may contain `{{ .path }}` templates which are
/// expanded against the other arguments of the same invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaticVariableArgument {
    pub name: String,
    pub value: String,
}

/// Reads a request variable. A name starting with `.` makes the entry a
/// template binding only: it is addressable by templates of sibling
/// arguments but never handed to the data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextVariableArgument {
    pub name: String,
    pub variable_name: String,
}

/// Projects a value out of the current object data buffer, typically the
/// list element being expanded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectVariableArgument {
    pub name: String,
    pub path: Vec<String>,
}

/// A nested group resolving to a JSON object, e.g. a header map. Keys of the
/// emitted object are sorted lexicographically for deterministic output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListArgument {
    pub name: String,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArg {
    pub key: Bytes,
    pub value: Bytes,
}

/// The key-ordered output of argument resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArgs {
    pairs: Vec<ResolvedArg>,
}

impl ResolvedArgs {
    pub fn by_key(&self, key: &[u8]) -> Option<&[u8]> {
        self.pairs
            .iter()
            .find(|pair| pair.key.as_ref() == key)
            .map(|pair| pair.value.as_ref())
    }

    pub fn first(&self) -> Option<&ResolvedArg> {
        self.pairs.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedArg> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn into_sorted_object(mut self) -> Bytes {
        self.pairs.sort_by(|a, b| a.key.cmp(&b.key));
        let mut out = Vec::with_capacity(64);
        out.push(b'{');
        for (index, pair) in self.pairs.iter().enumerate() {
            if index > 0 {
                out.push(b',');
            }
            json_writer::write_and_escape_string(&mut out, &String::from_utf8_lossy(&pair.key));
            out.push(b':');
            json_writer::write_and_escape_string(&mut out, &String::from_utf8_lossy(&pair.value));
        }
        out.push(b'}');
        Bytes::from(out)
    }
}

/// Reduces an argument list to resolved key/value pairs.
///
/// Resolution is two-phase: every argument first produces its raw value in
/// declaration order, then one template pass runs over the values of the
/// static arguments with all resolved entries (and the data buffer) in
/// scope. Because the scope is only assembled after phase one, a template
/// may reference a context binding declared after it. Entries whose key
/// starts with `.` are dropped from the final list.
pub fn resolve_arguments(
    arguments: &[Argument],
    ctx: &Context,
    data: Option<&[u8]>,
) -> ResolvedArgs {
    let mut pairs: Vec<ResolvedArg> = Vec::with_capacity(arguments.len());
    let mut static_indexes: Vec<usize> = Vec::new();

    for argument in arguments {
        match argument {
            Argument::Static(argument) => {
                static_indexes.push(pairs.len());
                pairs.push(ResolvedArg {
                    key: Bytes::copy_from_slice(argument.name.as_bytes()),
                    value: Bytes::copy_from_slice(argument.value.as_bytes()),
                });
            }
            Argument::Context(argument) => match ctx.variable(&argument.variable_name) {
                Some(value) => pairs.push(ResolvedArg {
                    key: Bytes::copy_from_slice(argument.name.as_bytes()),
                    value: value.clone(),
                }),
                None => {
                    warn!(
                        variable = %argument.variable_name,
                        "request variable not found, dropping argument"
                    );
                }
            },
            Argument::Object(argument) => {
                match data.and_then(|data| projection::select(data, &argument.path)) {
                    Some((value, _)) => pairs.push(ResolvedArg {
                        key: Bytes::copy_from_slice(argument.name.as_bytes()),
                        value,
                    }),
                    None => {
                        warn!(
                            path = ?argument.path,
                            "object variable path is absent, dropping argument"
                        );
                    }
                }
            }
            Argument::List(argument) => {
                let inner = resolve_arguments(&argument.arguments, ctx, data);
                pairs.push(ResolvedArg {
                    key: Bytes::copy_from_slice(argument.name.as_bytes()),
                    value: inner.into_sorted_object(),
                });
            }
        }
    }

    let scope = pairs.clone();
    for index in static_indexes {
        let value = template::interpolate(&pairs[index].value, &scope, data);
        pairs[index].value = value;
    }

    pairs.retain(|pair| !pair.key.starts_with(b"."));
    ResolvedArgs { pairs }
}
