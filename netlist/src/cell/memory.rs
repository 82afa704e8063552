use crate::{Const, ControlNet, Net, Value};

/// A generic multi-port memory, before technology mapping.
///
/// The cell output is the concatenation of the read port data, lowest port
/// first; each read port is `width` bits wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    /// Number of words.
    pub depth: usize,
    /// Number of data bits per word.
    pub width: usize,
    /// Power-up contents, `depth * width` trits. All-undef when the memory
    /// is uninitialized.
    pub init_value: Const,
    pub write_ports: Vec<MemoryWritePort>,
    pub read_ports: Vec<MemoryReadPort>,
}

/// `clock` of `None` makes the port unclocked: writes are level-sensitive,
/// reads are combinational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWritePort {
    pub addr: Value,
    pub data: Value,
    /// Per-bit write enable, same width as `data`.
    pub mask: Value,
    pub clock: Option<ControlNet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryReadPort {
    pub addr: Value,
    pub clock: Option<ControlNet>,
    /// Whether a synchronous read at the address of a concurrent write
    /// observes the new data. Recorded for downstream tooling; mapping
    /// passes in this project do not consult it.
    pub transparent: bool,
}

impl Memory {
    pub fn output_len(&self) -> usize {
        self.read_ports.len() * self.width
    }

    /// The address width of the memory, as wide as its widest port address.
    pub fn addr_bits(&self) -> usize {
        let write = self.write_ports.iter().map(|port| port.addr.len());
        let read = self.read_ports.iter().map(|port| port.addr.len());
        write.chain(read).max().unwrap_or(0)
    }

    /// The range of cell output bits driven by the given read port.
    pub fn read_port_output_slice(&self, port_index: usize) -> std::ops::Range<usize> {
        port_index * self.width..(port_index + 1) * self.width
    }

    pub fn validate(&self) {
        assert_eq!(self.init_value.len(), self.depth * self.width);
        for port in &self.write_ports {
            assert_eq!(port.data.len(), self.width);
            assert_eq!(port.mask.len(), self.width);
        }
    }

    pub fn visit(&self, mut f: impl FnMut(Net)) {
        for port in &self.write_ports {
            port.visit(&mut f);
        }
        for port in &self.read_ports {
            port.visit(&mut f);
        }
    }

    pub fn visit_mut(&mut self, mut f: impl FnMut(&mut Net)) {
        for port in &mut self.write_ports {
            port.visit_mut(&mut f);
        }
        for port in &mut self.read_ports {
            port.visit_mut(&mut f);
        }
    }
}

impl MemoryWritePort {
    pub fn visit(&self, mut f: impl FnMut(Net)) {
        self.addr.visit(&mut f);
        self.data.visit(&mut f);
        self.mask.visit(&mut f);
        if let Some(clock) = self.clock {
            clock.visit(&mut f);
        }
    }

    pub fn visit_mut(&mut self, mut f: impl FnMut(&mut Net)) {
        self.addr.visit_mut(&mut f);
        self.data.visit_mut(&mut f);
        self.mask.visit_mut(&mut f);
        if let Some(clock) = &mut self.clock {
            clock.visit_mut(&mut f);
        }
    }
}

impl MemoryReadPort {
    pub fn asynchronous(addr: impl Into<Value>) -> Self {
        Self { addr: addr.into(), clock: None, transparent: false }
    }

    pub fn clocked(addr: impl Into<Value>, clock: impl Into<ControlNet>) -> Self {
        Self { addr: addr.into(), clock: Some(clock.into()), transparent: false }
    }

    pub fn visit(&self, mut f: impl FnMut(Net)) {
        self.addr.visit(&mut f);
        if let Some(clock) = self.clock {
            clock.visit(&mut f);
        }
    }

    pub fn visit_mut(&mut self, mut f: impl FnMut(&mut Net)) {
        self.addr.visit_mut(&mut f);
        if let Some(clock) = &mut self.clock {
            clock.visit_mut(&mut f);
        }
    }
}
