use serde::{Deserialize, Serialize};

use crate::error::MapsforgeError;
use crate::subfile::SubFile;

/// Key/value attribute of a map entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    /// Key, e.g. `highway`.
    pub key: String,
    /// Value, e.g. `primary`.
    pub value: String,
}

impl Tag {
    /// Creates a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parses a `key=value` dictionary entry. The value is everything after the first `=`; an
    /// entry without `=` has an empty value.
    pub fn parse(entry: &str) -> Self {
        match entry.split_once('=') {
            Some((key, value)) => Self::new(key, value),
            None => Self::new(entry, ""),
        }
    }
}

/// Value placeholder that is replaced with data stored in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueTemplate {
    Byte,
    Int,
    Float,
    Short,
    String,
}

impl ValueTemplate {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "%b" => Some(Self::Byte),
            "%i" => Some(Self::Int),
            "%f" => Some(Self::Float),
            "%h" => Some(Self::Short),
            "%s" => Some(Self::String),
            _ => None,
        }
    }
}

/// Dictionary of point or path tags declared in the map header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagTable {
    entries: Vec<(Tag, Option<ValueTemplate>)>,
}

impl TagTable {
    /// Creates a dictionary from header entries in `key=value` form.
    pub fn new<'a>(entries: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| {
                    let tag = Tag::parse(entry);
                    let template = ValueTemplate::parse(&tag.value);
                    (tag, template)
                })
                .collect(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declared entry with the given id, with the template value untouched.
    pub fn get(&self, id: u32) -> Option<&Tag> {
        self.entries.get(id as usize).map(|(tag, _)| tag)
    }

    /// Reads `count` tag ids followed by the values of templated tags, and returns the resolved
    /// tags in id order.
    pub fn read_tags(&self, subfile: &mut SubFile, count: usize) -> Result<Vec<Tag>, MapsforgeError> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = subfile.read_vu32()?;
            if id as usize >= self.entries.len() {
                return Err(MapsforgeError::InvalidTagId {
                    id,
                    size: self.entries.len(),
                });
            }
            ids.push(id as usize);
        }

        let mut tags = Vec::with_capacity(count);
        for id in ids {
            let (tag, template) = &self.entries[id];
            let tag = match template {
                None => tag.clone(),
                Some(template) => Tag::new(
                    tag.key.clone(),
                    read_value(subfile, *template, &tag.key)?,
                ),
            };
            tags.push(tag);
        }

        Ok(tags)
    }
}

fn read_value(
    subfile: &mut SubFile,
    template: ValueTemplate,
    key: &str,
) -> Result<String, MapsforgeError> {
    Ok(match template {
        ValueTemplate::Byte => subfile.read_u8()?.to_string(),
        ValueTemplate::Int => {
            let value = subfile.read_i32()?;
            if key.contains(":colour") {
                format!("#{:06x}", value as u32 & 0x00FF_FFFF)
            } else {
                value.to_string()
            }
        }
        ValueTemplate::Float => f32::from_bits(subfile.read_u32()?).to_string(),
        ValueTemplate::Short => subfile.read_u16()?.to_string(),
        ValueTemplate::String => subfile.read_string()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::Bytes;

    fn table() -> TagTable {
        TagTable::new([
            "highway=primary",
            "layer=%b",
            "building:colour=%i",
            "width=%f",
            "ele=%h",
            "name:en=%s",
            "population=%i",
            "note=a=b",
            "bare",
        ])
    }

    #[test]
    fn parse_splits_at_first_equals() {
        let table = table();
        assert_eq!(table.get(7), Some(&Tag::new("note", "a=b")));
        assert_eq!(table.get(8), Some(&Tag::new("bare", "")));
        assert_eq!(table.get(9), None);
    }

    #[test]
    fn plain_and_templated_values() {
        let mut data = vec![0, 1, 2, 3, 4, 5, 6];
        data.push(7);
        data.extend_from_slice(&0x00AB_CDEFu32.to_be_bytes());
        data.extend_from_slice(&1.5f32.to_bits().to_be_bytes());
        data.extend_from_slice(&1234u16.to_be_bytes());
        data.extend_from_slice(&[4, b'P', b'r', b'a', b'g']);
        data.extend_from_slice(&(-42i32).to_be_bytes());

        let mut subfile = SubFile::new(Bytes::from(data));
        let tags = table().read_tags(&mut subfile, 7).unwrap();
        assert_eq!(
            tags,
            vec![
                Tag::new("highway", "primary"),
                Tag::new("layer", "7"),
                Tag::new("building:colour", "#abcdef"),
                Tag::new("width", "1.5"),
                Tag::new("ele", "1234"),
                Tag::new("name:en", "Prag"),
                Tag::new("population", "-42"),
            ]
        );
        assert_eq!(subfile.remaining(), 0);
    }

    #[test]
    fn invalid_tag_id() {
        let mut subfile = SubFile::new(Bytes::from_static(&[0, 9]));
        assert_matches!(
            table().read_tags(&mut subfile, 2),
            Err(MapsforgeError::InvalidTagId { id: 9, size: 9 })
        );
    }
}
