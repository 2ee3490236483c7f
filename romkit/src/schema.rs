//! Schema orchestrator
//!
//! A [`Schema`] is an ordered set of named sections. Each section is built by
//! an initializer that may look at other sections first (for example, an item
//! name enum read from the item table), so sections are resolved lazily and
//! at most once per pass through a [`Resolver`].
//!
//! ```text
//! decode(rom) ─▶ data ─▶ format(data) ─▶ texts
//!                                          │ edit
//! encode(data', rom) ◀─ data' ◀─ parse(texts')
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Annotate, CodecError, Result};
use crate::pass::Pass;
use crate::representation::Representation;
use crate::rom::Rom;
use crate::types::TypeRef;
use crate::types::reference::LabelSource;
use crate::value::{Fields, Value};

/// Which side of the round trip a fetched section is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// The decoded value
    Raw,
    /// The external tree produced by `format`
    #[default]
    Formatted,
}

/// A resolved top-level node and how it is written to disk.
#[derive(Debug, Clone)]
pub struct Section {
    pub codec: TypeRef,
    pub representation: Representation,
}

impl Section {
    pub fn new(codec: TypeRef, representation: Representation) -> Self {
        Self {
            codec,
            representation,
        }
    }
}

/// Builds a section, possibly after fetching others.
pub type SectionInit = Arc<dyn Fn(&mut Resolver<'_>) -> Result<Section> + Send + Sync>;

/// Where section values come from during a pass.
enum Source<'a> {
    Rom { rom: &'a mut Rom, pass: Pass },
    Texts(&'a IndexMap<String, String>),
}

/// Resolves sections on demand during a decode or parse pass.
pub struct Resolver<'a> {
    inits: &'a IndexMap<String, SectionInit>,
    source: Source<'a>,
    sections: IndexMap<String, Section>,
    values: Fields,
    active: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn new(inits: &'a IndexMap<String, SectionInit>, source: Source<'a>) -> Self {
        Self {
            inits,
            source,
            sections: IndexMap::new(),
            values: Fields::new(),
            active: Vec::new(),
        }
    }

    /// Value of section `name`, resolving it first if needed.
    pub fn fetch(&mut self, name: &str, state: State) -> Result<Value> {
        self.resolve(name)?;
        let value = &self.values[name];
        match state {
            State::Raw => Ok(value.clone()),
            State::Formatted => self.sections[name].codec.format(value).within(name),
        }
    }

    fn resolve(&mut self, name: &str) -> Result<()> {
        if self.values.contains_key(name) {
            return Ok(());
        }
        if self.active.iter().any(|a| a == name) {
            return Err(CodecError::Definition(format!(
                "section {name:?} depends on itself through {}",
                self.active.join(" -> ")
            )));
        }
        let inits = self.inits;
        let init = inits
            .get(name)
            .ok_or_else(|| CodecError::Definition(format!("unknown section {name:?}")))?;

        self.active.push(name.to_string());
        let resolved = self.load(name, init);
        self.active.pop();

        let (section, value) = resolved.within(name)?;
        debug!(section = name, "Section resolved");
        self.sections.insert(name.to_string(), section);
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    fn load(&mut self, name: &str, init: &SectionInit) -> Result<(Section, Value)> {
        let section = init(self)?;
        let value = match &mut self.source {
            Source::Rom { rom, pass } => section.codec.decode(rom, pass)?,
            Source::Texts(texts) => {
                let text = texts.get(name).ok_or_else(|| {
                    CodecError::Validation(format!("no text given for section {name:?}"))
                })?;
                let external = section.representation.read(text)?;
                section.codec.parse(&external)?
            }
        };
        Ok((section, value))
    }

    /// Resolve every section, returned in declaration order.
    fn run(mut self) -> Result<(IndexMap<String, Section>, Fields)> {
        let inits = self.inits;
        for name in inits.keys() {
            self.resolve(name)?;
        }
        let mut sections = IndexMap::with_capacity(inits.len());
        let mut values = Fields::with_capacity(inits.len());
        for name in inits.keys() {
            if let (Some(section), Some(value)) =
                (self.sections.swap_remove(name), self.values.swap_remove(name))
            {
                sections.insert(name.clone(), section);
                values.insert(name.clone(), value);
            }
        }
        Ok((sections, values))
    }
}

impl LabelSource for Resolver<'_> {
    fn fetch(&mut self, section: &str, state: State) -> Result<Value> {
        Resolver::fetch(self, section, state)
    }
}

/// Gives optimizing nodes access to other sections' optimized values.
pub struct Optimizer<'a> {
    sections: &'a IndexMap<String, Section>,
    data: &'a Fields,
    done: Fields,
    active: Vec<String>,
}

impl<'a> Optimizer<'a> {
    pub fn new(sections: &'a IndexMap<String, Section>, data: &'a Fields) -> Self {
        Self {
            sections,
            data,
            done: Fields::new(),
            active: Vec::new(),
        }
    }

    /// Optimized value of section `name`.
    pub fn fetch(&mut self, name: &str) -> Result<Value> {
        if let Some(value) = self.done.get(name) {
            return Ok(value.clone());
        }
        if self.active.iter().any(|a| a == name) {
            return Err(CodecError::Definition(format!(
                "optimizing {name:?} depends on itself"
            )));
        }
        let sections = self.sections;
        let data = self.data;
        let section = sections
            .get(name)
            .ok_or_else(|| CodecError::Definition(format!("unknown section {name:?}")))?;
        let value = data
            .get(name)
            .ok_or_else(|| CodecError::Validation(format!("no data for section {name:?}")))?;

        self.active.push(name.to_string());
        let optimized = section.codec.optimize(value, self).within(name);
        self.active.pop();

        let optimized = optimized?;
        self.done.insert(name.to_string(), optimized.clone());
        Ok(optimized)
    }
}

/// Named set of sections.
#[derive(Default)]
pub struct Schema {
    inits: IndexMap<String, SectionInit>,
    sections: Option<IndexMap<String, Section>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a section built by `init`.
    pub fn insert<F>(&mut self, name: impl Into<String>, init: F)
    where
        F: Fn(&mut Resolver<'_>) -> Result<Section> + Send + Sync + 'static,
    {
        self.inits.insert(name.into(), Arc::new(init));
        self.sections = None;
    }

    /// Add a section with a fixed node.
    pub fn insert_node(&mut self, name: impl Into<String>, codec: TypeRef, representation: Representation) {
        let section = Section::new(codec, representation);
        self.insert(name, move |_: &mut Resolver<'_>| Ok(section.clone()));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inits.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inits.is_empty()
    }

    fn resolved(&self) -> Result<&IndexMap<String, Section>> {
        self.sections.as_ref().ok_or_else(|| {
            CodecError::Validation("schema has not been decoded or parsed yet".into())
        })
    }

    fn section_data<'d>(data: &'d Fields, name: &str) -> Result<&'d Value> {
        data.get(name)
            .ok_or_else(|| CodecError::Validation(format!("no data for section {name:?}")))
    }

    /// Decode every section from `rom`.
    pub fn decode(&mut self, rom: &mut Rom) -> Result<Fields> {
        let resolver = Resolver::new(
            &self.inits,
            Source::Rom {
                rom,
                pass: Pass::new(),
            },
        );
        let (sections, data) = resolver.run()?;
        info!(sections = sections.len(), "Decoded schema");
        self.sections = Some(sections);
        Ok(data)
    }

    /// Parse every section from its external text.
    pub fn parse(&mut self, texts: &IndexMap<String, String>) -> Result<Fields> {
        let resolver = Resolver::new(&self.inits, Source::Texts(texts));
        let (sections, data) = resolver.run()?;
        info!(sections = sections.len(), "Parsed schema");
        self.sections = Some(sections);
        Ok(data)
    }

    /// External trees of every section.
    pub fn format_values(&self, data: &Fields) -> Result<Fields> {
        let mut formatted = Fields::new();
        for (name, section) in self.resolved()? {
            let value = section
                .codec
                .format(Self::section_data(data, name)?)
                .within(name)?;
            formatted.insert(name.clone(), value);
        }
        Ok(formatted)
    }

    /// Render every section to text in its representation.
    pub fn format(&self, data: &Fields) -> Result<IndexMap<String, String>> {
        let formatted = self.format_values(data)?;
        let mut texts = IndexMap::new();
        for (name, section) in self.resolved()? {
            let text = section
                .representation
                .render(&formatted[name.as_str()])
                .within(name)?;
            texts.insert(name.clone(), text);
        }
        Ok(texts)
    }

    /// Encode every section onto a copy of `rom`.
    ///
    /// The source image is left untouched; on failure no image is returned.
    pub fn encode(&self, data: &Fields, rom: &Rom) -> Result<Rom> {
        let mut out = rom.clone();
        let mut pass = Pass::new();
        for (name, section) in self.resolved()? {
            section
                .codec
                .encode(Self::section_data(data, name)?, &mut out, &mut pass)
                .within(name)?;
            debug!(section = name.as_str(), "Section encoded");
        }
        pass.finish(&mut out)?;
        info!(bytes = out.len(), "Encoded schema");
        Ok(out)
    }

    /// Rewrite every section into an equivalent, cheaper value.
    pub fn optimize(&self, data: &Fields) -> Result<Fields> {
        let sections = self.resolved()?;
        let mut optimizer = Optimizer::new(sections, data);
        let mut optimized = Fields::new();
        for name in sections.keys() {
            optimized.insert(name.clone(), optimizer.fetch(name)?);
        }
        Ok(optimized)
    }

    /// File extension of every section.
    pub fn extensions(&self) -> Result<IndexMap<String, &'static str>> {
        Ok(self
            .resolved()?
            .iter()
            .map(|(name, section)| (name.clone(), section.representation.extension()))
            .collect())
    }
}

#[cfg(test)]
mod tests;
