//! Text forms of fields: tokenizing configuration lines, parsing and formatting values,
//! and the description/summary/dump views built on them.

use serde_json::{Map, Value};

use super::access::FieldBlock;
use super::schema::{FieldDescriptor, FieldFlags, FieldType};
use super::value::FieldValue;
use crate::error::{CoreError, CoreResult};

/// Split a configuration line into tokens.
///
/// Whitespace separates tokens, double quotes group a token (and may produce an empty one),
/// and `#` outside quotes starts a comment running to the end of the line. Inside quotes a
/// backslash takes the next character literally, so `\"` and `\\` stand for `"` and `\`.
pub fn tokenize(line: &str) -> CoreResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        if quoted {
            match c {
                '"' => quoted = false,
                '\\' => escaped = true,
                c => current.push(c),
            }
            continue;
        }
        match c {
            '"' => {
                quoted = true;
                in_token = true;
            }
            '#' => break,
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quoted {
        return Err(CoreError::Config(format!("unterminated quote in '{}'", line.trim())));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Quote a token if it would not survive [`tokenize`] unchanged.
pub fn quote(token: &str) -> String {
    if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c == '#' || c == '"') {
        let mut quoted = String::with_capacity(token.len() + 2);
        quoted.push('"');
        for c in token.chars() {
            if c == '"' || c == '\\' {
                quoted.push('\\');
            }
            quoted.push(c);
        }
        quoted.push('"');
        quoted
    } else {
        token.to_string()
    }
}

/// Parse one element of `desc` from a token.
pub fn parse_element(desc: &FieldDescriptor, token: &str) -> CoreResult<FieldValue> {
    let bad = |what: &str| CoreError::invalid(&desc.name, format!("'{token}' is not {what}"));
    let parsed = match desc.field_type {
        FieldType::Bool => match token {
            "1" | "true" | "yes" | "on" => FieldValue::Bool(true),
            "0" | "false" | "no" | "off" => FieldValue::Bool(false),
            _ => return Err(bad("a boolean")),
        },
        FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64 => {
            FieldValue::UInt64(parse_unsigned(token).ok_or_else(|| bad("an unsigned integer"))?)
        }
        ty if ty.is_integer() => {
            FieldValue::Int64(token.parse().map_err(|_| bad("an integer"))?)
        }
        FieldType::Float | FieldType::Double => {
            FieldValue::Double(token.parse().map_err(|_| bad("a number"))?)
        }
        FieldType::String => FieldValue::String(token.to_string()),
        FieldType::RecordRef => FieldValue::RecordRef(token.to_string()),
        FieldType::Opaque => FieldValue::Bytes(parse_hex(token).ok_or_else(|| bad("hex bytes"))?),
        _ => return Err(bad("parseable")),
    };
    parsed.coerce(&desc.name, desc.field_type)
}

fn parse_unsigned(token: &str) -> Option<u64> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

fn parse_hex(token: &str) -> Option<Vec<u8>> {
    if token.len() % 2 != 0 {
        return None;
    }
    (0..token.len())
        .step_by(2)
        .map(|i| token.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

/// Format a field value as tokens, one per element.
fn element_tokens(value: FieldValue) -> Vec<String> {
    value
        .flatten()
        .into_iter()
        .map(|v| match v {
            FieldValue::String(s) | FieldValue::RecordRef(s) => quote(&s),
            other => other.to_string(),
        })
        .collect()
}

impl FieldBlock {
    /// Read a field as text. Array elements are separated by single spaces.
    pub fn get_text(&self, name: &str) -> CoreResult<String> {
        Ok(element_tokens(self.get(name)?).join(" "))
    }

    /// Parse and write a field from text on behalf of a client.
    pub fn set_text(&mut self, name: &str, text: &str) -> CoreResult<()> {
        let value = self.parse_text(name, text)?;
        self.set(name, value)
    }

    /// Parse and write a field from text ignoring the read-only flag.
    pub fn store_text(&mut self, name: &str, text: &str) -> CoreResult<()> {
        let value = self.parse_text(name, text)?;
        self.store(name, value)
    }

    fn parse_text(&self, name: &str, text: &str) -> CoreResult<FieldValue> {
        let desc = self.descriptor(name)?.clone();
        let tokens = if matches!(desc.field_type, FieldType::String) && desc.is_scalar() {
            vec![text.to_string()]
        } else {
            tokenize(text)?
        };
        if desc.is_scalar() {
            return match tokens.as_slice() {
                [token] => parse_element(&desc, token),
                _ => Err(CoreError::invalid(name, "expected exactly one value")),
            };
        }
        let elements = tokens
            .iter()
            .map(|t| parse_element(&desc, t))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(FieldValue::Array(elements))
    }

    /// Tokens of every `IN_DESCRIPTION` field, in schema order.
    pub fn description_tokens(&self) -> CoreResult<Vec<String>> {
        let mut tokens = Vec::new();
        for desc in self.schema().iter() {
            if desc.flags.contains(FieldFlags::IN_DESCRIPTION) {
                tokens.extend(element_tokens(self.get(&desc.name)?));
            }
        }
        Ok(tokens)
    }

    /// `name=value` pairs of every `IN_SUMMARY` field.
    pub fn summary_pairs(&self) -> CoreResult<Vec<String>> {
        let mut pairs = Vec::new();
        for desc in self.schema().iter() {
            if desc.flags.contains(FieldFlags::IN_SUMMARY) {
                pairs.push(format!("{}={}", desc.name, self.get_text(&desc.name)?));
            }
        }
        Ok(pairs)
    }

    /// One `name = value` line per accessible field.
    pub fn dump_lines(&self) -> CoreResult<Vec<String>> {
        let mut lines = Vec::new();
        for desc in self.schema().iter() {
            if !desc.flags.contains(FieldFlags::NO_ACCESS) {
                lines.push(format!("{:>24} = {}", desc.name, self.get_text(&desc.name)?));
            }
        }
        Ok(lines)
    }

    /// Insert every accessible field into a JSON object.
    pub fn write_json(&self, object: &mut Map<String, Value>) -> CoreResult<()> {
        for desc in self.schema().iter() {
            if desc.flags.contains(FieldFlags::NO_ACCESS) {
                continue;
            }
            let value = serde_json::to_value(self.get(&desc.name)?)
                .map_err(|e| CoreError::invalid(&desc.name, e.to_string()))?;
            object.insert(desc.name.clone(), value);
        }
        Ok(())
    }
}

/// Consumes description tokens field by field across the blocks of a record.
pub struct DescriptionParser<'a> {
    tokens: &'a [String],
    position: usize,
}

impl<'a> DescriptionParser<'a> {
    /// A parser over `tokens`, starting at the first one.
    pub fn new(tokens: &'a [String]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn take(&mut self, field: &str, count: usize) -> CoreResult<&'a [String]> {
        let end = self.position + count;
        let slice = self.tokens.get(self.position..end).ok_or_else(|| {
            CoreError::Config(format!(
                "description ended before field '{}' ({} more value(s) needed)",
                field,
                end - self.tokens.len()
            ))
        })?;
        self.position = end;
        Ok(slice)
    }

    /// Fill the `IN_DESCRIPTION` fields of `block` from the next tokens.
    ///
    /// A varargs field takes as many tokens as its length field already holds, and its
    /// capacity is grown to fit.
    pub fn fill(&mut self, block: &mut FieldBlock) -> CoreResult<()> {
        let fields: Vec<FieldDescriptor> = block
            .schema()
            .iter()
            .filter(|d| d.flags.contains(FieldFlags::IN_DESCRIPTION))
            .cloned()
            .collect();
        for desc in fields {
            if desc.is_scalar() {
                let token = &self.take(&desc.name, 1)?[0];
                let value = parse_element(&desc, token)?;
                if let Some(length) = value.as_u64().and_then(|n| usize::try_from(n).ok()) {
                    let dependents: Vec<String> = block
                        .schema()
                        .dependents_of(&desc.name)
                        .map(|d| d.name.clone())
                        .collect();
                    for dependent in dependents {
                        if block.capacity_of(&dependent)? < length {
                            block.reserve_varargs(&dependent, length)?;
                        }
                    }
                }
                block.store(&desc.name, value)?;
            } else if desc.is_varargs() {
                let length_name = desc.length_field.as_deref().unwrap_or_default();
                let length = usize::try_from(block.get_i64(length_name)?)
                    .map_err(|_| CoreError::invalid(length_name, "negative length"))?;
                if block.capacity_of(&desc.name)? < length {
                    block.reserve_varargs(&desc.name, length)?;
                }
                let values = self
                    .take(&desc.name, length)?
                    .iter()
                    .map(|t| parse_element(&desc, t))
                    .collect::<CoreResult<Vec<_>>>()?;
                block.store(&desc.name, FieldValue::Array(values))?;
            } else {
                let count = desc.fixed_count().unwrap_or_default();
                let values = self
                    .take(&desc.name, count)?
                    .iter()
                    .map(|t| parse_element(&desc, t))
                    .collect::<CoreResult<Vec<_>>>()?;
                block.store(&desc.name, FieldValue::Array(values))?;
            }
        }
        Ok(())
    }

    /// Fail if tokens remain after every block has been filled.
    pub fn finish(self) -> CoreResult<()> {
        match self.tokens.get(self.position..) {
            Some(rest) if !rest.is_empty() => Err(CoreError::Config(format!(
                "unexpected trailing value(s): {}",
                rest.join(" ")
            ))),
            _ => Ok(()),
        }
    }
}
