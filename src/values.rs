//! Diagnostics sink for tape statistics.

use std::fmt::{self, Display};

const MB: f64 = 1024.0 * 1024.0;

/// A reported value.
#[derive(Clone, Debug, PartialEq)]
pub enum TapeValue {
    Unsigned(usize),
    Double(f64),
}

/// One named entry of a section.
#[derive(Clone, Debug, PartialEq)]
pub struct TapeEntry {
    pub name: String,
    pub value: TapeValue,
    /// Memory entries are given in bytes and rendered in MB.
    pub is_memory: bool,
}

/// A titled group of entries.
#[derive(Clone, Debug, PartialEq)]
pub struct TapeSection {
    pub name: String,
    pub entries: Vec<TapeEntry>,
}

/// Read-only statistics report collected from a tape.
///
/// Filling a `TapeValues` never touches recording or evaluation state.
#[derive(Clone, Debug, PartialEq)]
pub struct TapeValues {
    title: String,
    sections: Vec<TapeSection>,
}

impl TapeValues {
    pub fn new(title: impl Into<String>) -> Self {
        TapeValues {
            title: title.into(),
            sections: Vec::new(),
        }
    }

    /// Start a new section. Subsequent entries are added to it.
    pub fn add_section(&mut self, name: impl Into<String>) {
        self.sections.push(TapeSection {
            name: name.into(),
            entries: Vec::new(),
        });
    }

    pub fn add_unsigned_entry(&mut self, name: impl Into<String>, value: usize) {
        self.push_entry(name.into(), TapeValue::Unsigned(value), false);
    }

    /// Add a floating-point entry. With `is_memory`, `value` is in bytes.
    pub fn add_double_entry(&mut self, name: impl Into<String>, value: f64, is_memory: bool) {
        self.push_entry(name.into(), TapeValue::Double(value), is_memory);
    }

    fn push_entry(&mut self, name: String, value: TapeValue, is_memory: bool) {
        if self.sections.is_empty() {
            self.add_section("General");
        }
        if let Some(section) = self.sections.last_mut() {
            section.entries.push(TapeEntry {
                name,
                value,
                is_memory,
            });
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn sections(&self) -> &[TapeSection] {
        &self.sections
    }

    /// Look up an entry by section and entry name.
    pub fn entry(&self, section: &str, name: &str) -> Option<&TapeValue> {
        self.sections
            .iter()
            .filter(|s| s.name == section)
            .flat_map(|s| s.entries.iter())
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    /// Sum of all memory entries, in bytes.
    pub fn used_memory(&self) -> f64 {
        self.sections
            .iter()
            .flat_map(|s| s.entries.iter())
            .filter(|e| e.is_memory)
            .map(|e| match e.value {
                TapeValue::Unsigned(v) => v as f64,
                TapeValue::Double(v) => v,
            })
            .sum()
    }
}

impl Display for TapeValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(53);
        writeln!(f, "{rule}")?;
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "{:<32}{:>12.2} MB", "Total memory used", self.used_memory() / MB)?;
        for section in &self.sections {
            writeln!(f, "{rule}")?;
            writeln!(f, "{}", section.name)?;
            writeln!(f, "{rule}")?;
            for entry in &section.entries {
                match entry.value {
                    TapeValue::Unsigned(v) => writeln!(f, "  {:<30}{:>12}", entry.name, v)?,
                    TapeValue::Double(v) if entry.is_memory => {
                        writeln!(f, "  {:<30}{:>12.2} MB", entry.name, v / MB)?
                    }
                    TapeValue::Double(v) => writeln!(f, "  {:<30}{:>12.2}", entry.name, v)?,
                }
            }
        }
        write!(f, "{rule}")
    }
}
