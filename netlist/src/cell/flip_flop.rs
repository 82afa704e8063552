use crate::{Const, ControlNet, Net, Value};

/// A flip-flop cell.
///
/// - at the beginning of time, the output is set to `init_value`
/// - on every active edge of `clock`, if `enable` is active, the output is
///   set to `data`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlipFlop {
    pub data: Value,
    pub clock: ControlNet,
    pub enable: ControlNet,
    /// Must have the same width as `data`.
    pub init_value: Const,
}

impl FlipFlop {
    pub fn new(data: impl Into<Value>, clock: impl Into<ControlNet>) -> Self {
        let data = data.into();
        let width = data.len();
        FlipFlop { data, clock: clock.into(), enable: ControlNet::ONE, init_value: Const::undef(width) }
    }

    pub fn with_enable(self, enable: impl Into<ControlNet>) -> Self {
        Self { enable: enable.into(), ..self }
    }

    pub fn with_init(self, value: impl Into<Const>) -> Self {
        Self { init_value: value.into(), ..self }
    }

    pub fn output_len(&self) -> usize {
        self.data.len()
    }

    pub fn has_enable(&self) -> bool {
        !self.enable.is_always(true)
    }

    pub fn has_init_value(&self) -> bool {
        !self.init_value.is_undef()
    }

    pub fn visit(&self, mut f: impl FnMut(Net)) {
        self.data.visit(&mut f);
        self.clock.visit(&mut f);
        self.enable.visit(&mut f);
    }

    pub fn visit_mut(&mut self, mut f: impl FnMut(&mut Net)) {
        self.data.visit_mut(&mut f);
        self.clock.visit_mut(&mut f);
        self.enable.visit_mut(&mut f);
    }
}
