//! Element collection: the unit of data flowing along graph connections.
//!
//! Elements live in an ordered `Vec`; per-element attributes live in named
//! [`AttributeColumn`]s. Every public mutation ends with every column as long
//! as the element list (`ensure_size`).
//!
//! `Clone` is deep: elements and column buffers are copied, nothing aliases.
//! The cook engine relies on that for copy-on-write across node boundaries.

use std::collections::HashSet;

use indexmap::IndexMap;

use super::attribute::{AttributeColumn, AttributeError, AttributeKind};
use super::element::Element;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementCollection {
    elements: Vec<Element>,
    attributes: IndexMap<String, AttributeColumn>,
}

impl ElementCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: Vec<Element>) -> Self {
        Self {
            elements,
            attributes: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [Element] {
        &mut self.elements
    }

    /// Append one element; columns grow with a zero entry.
    pub fn push(&mut self, element: Element) {
        self.elements.push(element);
        self.ensure_size();
    }

    /// Grow or shrink every column to the element count.
    pub fn ensure_size(&mut self) {
        let len = self.elements.len();
        for column in self.attributes.values_mut() {
            if column.len() != len {
                column.resize(len, false);
            }
        }
    }

    // --- Attributes ---

    /// Get or create a column. An existing column of another kind is an error.
    pub fn add_attribute(
        &mut self,
        name: &str,
        kind: AttributeKind,
    ) -> Result<&mut AttributeColumn, AttributeError> {
        let len = self.elements.len();
        let column = self
            .attributes
            .entry(name.to_string())
            .or_insert_with(|| AttributeColumn::new(kind, len));
        if column.kind() != kind {
            return Err(AttributeError::KindMismatch {
                expected: kind,
                found: column.kind(),
            });
        }
        Ok(column)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeColumn> {
        self.attributes.get(name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut AttributeColumn> {
        self.attributes.get_mut(name)
    }

    pub fn require_attribute(&self, name: &str) -> Result<&AttributeColumn, AttributeError> {
        self.attributes
            .get(name)
            .ok_or_else(|| AttributeError::Missing(name.to_string()))
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<AttributeColumn> {
        self.attributes.shift_remove(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    // --- Structural operations ---

    /// Concatenate `other` after this collection.
    ///
    /// Columns only the receiver has are zero-filled for the donor's elements;
    /// columns only the donor has are created here, zero-filled for the
    /// receiver's existing elements. Kind conflicts abort before any change.
    pub fn append(&mut self, other: &ElementCollection) -> Result<(), AttributeError> {
        for (name, donor) in &other.attributes {
            if let Some(existing) = self.attributes.get(name) {
                if existing.kind() != donor.kind() {
                    return Err(AttributeError::KindMismatch {
                        expected: existing.kind(),
                        found: donor.kind(),
                    });
                }
            }
        }

        let receiver_len = self.elements.len();
        let donor_len = other.elements.len();

        for (name, donor) in &other.attributes {
            let column = self
                .attributes
                .entry(name.clone())
                .or_insert_with(|| AttributeColumn::new(donor.kind(), receiver_len));
            column.append(donor)?;
        }
        for (name, column) in self.attributes.iter_mut() {
            if !other.attributes.contains_key(name) {
                column.resize(receiver_len + donor_len, false);
            }
        }

        self.elements.extend(other.elements.iter().cloned());
        self.ensure_size();
        Ok(())
    }

    /// Keep only elements whose index is in `keep`, preserving order.
    pub fn filter_indexes(&mut self, keep: &HashSet<usize>) {
        let elements = std::mem::take(&mut self.elements);
        self.elements = elements
            .into_iter()
            .enumerate()
            .filter(|(i, _)| keep.contains(i))
            .map(|(_, el)| el)
            .collect();
        for column in self.attributes.values_mut() {
            column.filter_indexes(keep);
        }
    }

    /// Keep elements matching `predicate` (index, element).
    pub fn retain(&mut self, mut predicate: impl FnMut(usize, &Element) -> bool) {
        let keep: HashSet<usize> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(i, el)| predicate(*i, el))
            .map(|(i, _)| i)
            .collect();
        if keep.len() != self.elements.len() {
            self.filter_indexes(&keep);
        }
    }

    pub fn shift_time(&mut self, offset: f64) {
        for el in &mut self.elements {
            el.shift_time(offset);
        }
    }

    /// (earliest start, latest end) over all animated elements.
    pub fn time_span(&self) -> Option<(f64, f64)> {
        let start = self.elements.iter().filter_map(Element::start_time).reduce(f64::min)?;
        let end = self.elements.iter().filter_map(Element::end_time).reduce(f64::max)?;
        Some((start, end))
    }
}
