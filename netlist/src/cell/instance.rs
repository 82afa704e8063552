use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::Range;

use crate::{Const, Net, Value};

/// A parameter value on an [`Instance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Const(Const),
    Int(i64),
    String(String),
}

impl From<Const> for ParamValue {
    fn from(value: Const) -> Self {
        Self::Const(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Const(crate::Trit::from(value).into())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ParamValue::Const(value) => write!(f, "{}", value),
            ParamValue::Int(value) => write!(f, "#{}", value),
            ParamValue::String(value) => write!(f, "{:?}", value),
        }
    }
}

/// An instance of a primitive that is opaque to this library. Parameters,
/// inputs, and outputs are keyed by the primitive's pin and parameter names;
/// each output owns a disjoint range of the cell's output bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub kind: String,
    pub params: BTreeMap<String, ParamValue>,
    pub inputs: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, Range<usize>>,
}

impl Instance {
    pub fn new(kind: impl Into<String>) -> Self {
        Instance { kind: kind.into(), params: BTreeMap::new(), inputs: BTreeMap::new(), outputs: BTreeMap::new() }
    }

    pub fn output_len(&self) -> usize {
        self.outputs.values().map(|range| range.end).max().unwrap_or(0)
    }

    pub fn add_param(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(name.into(), value.into());
    }

    pub fn add_input(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.inputs.insert(name.into(), value.into());
    }

    /// Appends an output of the given width after all existing outputs and
    /// returns the range of cell output bits allocated to it.
    pub fn add_output(&mut self, name: impl Into<String>, width: usize) -> Range<usize> {
        let start = self.output_len();
        let range = start..start + width;
        self.outputs.insert(name.into(), range.clone());
        range
    }

    pub fn get_output(&self, name: &str) -> Option<Range<usize>> {
        self.outputs.get(name).cloned()
    }

    pub fn validate(&self) {
        let mut ranges = Vec::from_iter(self.outputs.values().cloned());
        ranges.sort_by_key(|range| range.start);
        for pair in ranges.windows(2) {
            assert!(pair[0].end <= pair[1].start, "instance output ranges must not overlap");
        }
    }

    pub fn visit(&self, mut f: impl FnMut(Net)) {
        for value in self.inputs.values() {
            value.visit(&mut f);
        }
    }

    pub fn visit_mut(&mut self, mut f: impl FnMut(&mut Net)) {
        for value in self.inputs.values_mut() {
            value.visit_mut(&mut f);
        }
    }
}
