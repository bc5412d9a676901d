use crate::error::{Error, Result};
use rust_stemmers::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Snowball stemming languages, addressed by their two-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "ar")]
    Arabic,
    #[serde(rename = "da")]
    Danish,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "el")]
    Greek,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "fi")]
    Finnish,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "hu")]
    Hungarian,
    #[serde(rename = "it")]
    Italian,
    #[serde(rename = "nl")]
    Dutch,
    #[serde(rename = "no")]
    Norwegian,
    #[serde(rename = "pt")]
    Portuguese,
    #[serde(rename = "ro")]
    Romanian,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "sv")]
    Swedish,
    #[serde(rename = "ta")]
    Tamil,
    #[serde(rename = "tr")]
    Turkish,
}

impl Language {
    const ALL: [(&'static str, Language); 18] = [
        ("ar", Language::Arabic),
        ("da", Language::Danish),
        ("de", Language::German),
        ("el", Language::Greek),
        ("en", Language::English),
        ("es", Language::Spanish),
        ("fi", Language::Finnish),
        ("fr", Language::French),
        ("hu", Language::Hungarian),
        ("it", Language::Italian),
        ("nl", Language::Dutch),
        ("no", Language::Norwegian),
        ("pt", Language::Portuguese),
        ("ro", Language::Romanian),
        ("ru", Language::Russian),
        ("sv", Language::Swedish),
        ("ta", Language::Tamil),
        ("tr", Language::Turkish),
    ];

    pub fn code(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, lang)| *lang == self)
            .map(|(code, _)| *code)
            .unwrap_or("en")
    }

    pub fn algorithm(self) -> Algorithm {
        match self {
            Language::Arabic => Algorithm::Arabic,
            Language::Danish => Algorithm::Danish,
            Language::German => Algorithm::German,
            Language::Greek => Algorithm::Greek,
            Language::English => Algorithm::English,
            Language::Spanish => Algorithm::Spanish,
            Language::Finnish => Algorithm::Finnish,
            Language::French => Algorithm::French,
            Language::Hungarian => Algorithm::Hungarian,
            Language::Italian => Algorithm::Italian,
            Language::Dutch => Algorithm::Dutch,
            Language::Norwegian => Algorithm::Norwegian,
            Language::Portuguese => Algorithm::Portuguese,
            Language::Romanian => Algorithm::Romanian,
            Language::Russian => Algorithm::Russian,
            Language::Swedish => Algorithm::Swedish,
            Language::Tamil => Algorithm::Tamil,
            Language::Turkish => Algorithm::Turkish,
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, lang)| *lang)
            .ok_or(Error::InvalidLanguage(code))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortableKind {
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreetextOptions {
    pub language: Language,
    pub spell: bool,
}

/// One treatment applied to a field. A field may carry several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FieldAction {
    IndexExact,
    Sortable { kind: SortableKind },
    StoreContent,
    IndexFreetext { language: Language, spell: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub exact: bool,
    pub sortable: Option<SortableKind>,
    pub stored: bool,
    pub freetext: Option<FreetextOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self { Self::default() }

    /// The schema used for indexing a directory tree: `path` is the exact
    /// identifier, `mtime`/`ctime` are sortable timestamps, and `content` is
    /// analyzed but never stored.
    pub fn file_index(language: Language) -> Self {
        let timestamp = FieldSpec { sortable: Some(SortableKind::Float), stored: true, ..FieldSpec::default() };
        let fields = BTreeMap::from([
            ("path".to_string(), FieldSpec { exact: true, stored: true, ..FieldSpec::default() }),
            ("mtime".to_string(), timestamp.clone()),
            ("ctime".to_string(), timestamp),
            (
                "content".to_string(),
                FieldSpec { freetext: Some(FreetextOptions { language, spell: true }), ..FieldSpec::default() },
            ),
        ]);
        Self { fields }
    }

    /// Register one more action for `field`. Identical re-declarations are
    /// accepted; conflicting ones fail.
    pub fn declare(&mut self, field: &str, action: FieldAction) -> Result<()> {
        validate_field_name(field)?;
        let spec = self.fields.entry(field.to_string()).or_default();
        match action {
            FieldAction::IndexExact => spec.exact = true,
            FieldAction::StoreContent => spec.stored = true,
            FieldAction::Sortable { kind } => match spec.sortable {
                Some(existing) if existing != kind => {
                    return Err(Error::InvalidSchema(format!(
                        "field {field} already sortable as {existing:?}"
                    )))
                }
                _ => spec.sortable = Some(kind),
            },
            FieldAction::IndexFreetext { language, spell } => {
                let opts = FreetextOptions { language, spell };
                match spec.freetext {
                    Some(existing) if existing != opts => {
                        return Err(Error::InvalidSchema(format!(
                            "field {field} already indexed as free text with {existing:?}"
                        )))
                    }
                    _ => spec.freetext = Some(opts),
                }
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> { self.fields.get(name) }

    pub fn contains(&self, name: &str) -> bool { self.fields.contains_key(name) }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Free-text fields, searched by default for unqualified query words.
    pub fn freetext_fields(&self) -> impl Iterator<Item = (&str, FreetextOptions)> {
        self.fields
            .iter()
            .filter_map(|(name, spec)| spec.freetext.map(|opts| (name.as_str(), opts)))
    }

    /// Describe the first difference against `other`, if any.
    pub fn difference(&self, other: &Schema) -> Option<String> {
        for (name, spec) in &self.fields {
            match other.fields.get(name) {
                None => return Some(format!("field {name} is not declared in the persisted schema")),
                Some(theirs) if theirs != spec => {
                    return Some(format!("field {name} declared as {spec:?}, persisted as {theirs:?}"))
                }
                _ => {}
            }
        }
        other
            .fields
            .keys()
            .find(|name| !self.fields.contains_key(*name))
            .map(|name| format!("persisted field {name} is missing from the declared schema"))
    }
}

fn validate_field_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidSchema(format!("invalid field name {name:?}")))
    }
}
