use std::fmt::Display;

use crate::{Cell, FlipFlop, Instance, Memory, Net, Trit, Value};

/// The cell arena. Every cell occupies as many consecutive slots as it has
/// output bits (at least one), so that a [`Net`] doubles as an index of a
/// single output bit; slots past the first hold [`Slot::Skip`] markers
/// pointing back at the cell.
#[derive(Debug, Clone)]
enum Slot {
    Cell(Box<Cell>),
    Skip(u32),
    /// A placeholder driver for nets that will be connected later (or a
    /// removed cell). Resolved designs contain no references to void bits.
    Void(u32),
}

#[derive(Debug)]
pub struct Design {
    slots: Vec<Slot>,
}

/// Index of a cell in the arena; stable across cell removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIndex(pub(crate) usize);

impl CellIndex {
    /// The arena index, as it appears in the printed form of the design.
    pub fn debug_index(self) -> usize {
        self.0
    }
}

impl Display for CellIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl Design {
    pub fn new() -> Design {
        Design { slots: vec![] }
    }

    fn add_slots(&mut self, slot: Slot, width: usize) -> Value {
        let index = self.slots.len();
        self.slots.push(slot);
        for _ in 1..width {
            self.slots.push(Slot::Skip(index as u32));
        }
        Value::cell(index, width)
    }

    pub fn add_cell(&mut self, cell: Cell) -> Value {
        cell.validate();
        let width = cell.output_len();
        self.add_slots(Slot::Cell(Box::new(cell)), width)
    }

    /// Adds `width` bits of placeholder driver, to be wired up later with
    /// [`Design::replace_value`].
    pub fn add_void(&mut self, width: usize) -> Value {
        self.add_slots(Slot::Void(width as u32), width)
    }

    pub fn add_eq(&mut self, arg1: impl Into<Value>, arg2: impl Into<Value>) -> Net {
        self.add_cell(Cell::Eq(arg1.into(), arg2.into())).unwrap_net()
    }

    pub fn add_mux(&mut self, sel: Net, arg1: impl Into<Value>, arg2: impl Into<Value>) -> Value {
        self.add_cell(Cell::Mux(sel, arg1.into(), arg2.into()))
    }

    pub fn add_dff(&mut self, flip_flop: FlipFlop) -> Value {
        self.add_cell(Cell::Dff(flip_flop))
    }

    pub fn add_memory(&mut self, memory: Memory) -> Value {
        self.add_cell(Cell::Memory(memory))
    }

    pub fn add_other(&mut self, instance: Instance) -> Value {
        self.add_cell(Cell::Other(instance))
    }

    pub fn add_input(&mut self, name: impl Into<String>, width: usize) -> Value {
        self.add_cell(Cell::Input(name.into(), width))
    }

    pub fn add_output(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.add_cell(Cell::Output(name.into(), value.into()));
    }

    fn cell_slot(&self, net: Net) -> Option<usize> {
        let index = net.as_cell_index()?;
        if index >= self.slots.len() {
            return None;
        }
        Some(match self.slots[index] {
            Slot::Skip(start) => start as usize,
            _ => index,
        })
    }

    /// Resolves a net to the cell driving it and the bit offset within that
    /// cell's output. Constant nets resolve to their [`Trit`] instead.
    ///
    /// Panics when the net refers to a void (disconnected) bit.
    pub fn find_cell(&self, net: Net) -> Result<(CellIndex, usize), Trit> {
        if let Some(trit) = net.as_const() {
            return Err(trit);
        }
        let start = self.cell_slot(net).expect("net should be within the design");
        match self.slots[start] {
            Slot::Cell(_) => Ok((CellIndex(start), net.as_cell_index().unwrap() - start)),
            _ => panic!("net {} is not driven", net),
        }
    }

    pub(crate) fn is_driven(&self, net: Net) -> bool {
        match self.cell_slot(net) {
            Some(start) => matches!(self.slots[start], Slot::Cell(_)),
            None => net.is_const(),
        }
    }

    pub fn get_cell(&self, index: CellIndex) -> &Cell {
        match &self.slots[index.0] {
            Slot::Cell(cell) => cell,
            _ => panic!("{} is not a cell", index),
        }
    }

    pub fn cell_output(&self, index: CellIndex) -> Value {
        Value::cell(index.0, self.get_cell(index).output_len())
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = (CellIndex, &Cell)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Cell(cell) => Some((CellIndex(index), &**cell)),
            _ => None,
        })
    }

    /// Rewrites every reference to `from` (in any cell) into `to`. The old
    /// driver keeps driving `from`; only the uses move.
    pub fn replace_net(&mut self, from: Net, to: Net) {
        if from == to {
            return;
        }
        for slot in &mut self.slots {
            if let Slot::Cell(cell) = slot {
                cell.visit_mut(|net| {
                    if *net == from {
                        *net = to;
                    }
                });
            }
        }
    }

    pub fn replace_value(&mut self, from: &Value, to: &Value) {
        assert_eq!(from.len(), to.len());
        for (from, to) in from.iter().zip(to.iter()) {
            self.replace_net(from, to);
        }
    }

    /// Removes the cell, leaving a void in its place; the indices of all
    /// other cells are unaffected.
    pub fn remove_cell(&mut self, index: CellIndex) {
        let width = self.get_cell(index).output_len();
        self.slots[index.0] = Slot::Void(width.max(1) as u32);
    }

    /// Checks that no cell references a void bit or a bit past the end of
    /// the arena. Cheap enough to run after every pass in tests.
    pub fn validate(&self) {
        for (index, cell) in self.iter_cells() {
            cell.visit(|net| {
                assert!(self.is_driven(net), "cell {} references undriven net {}", index, net);
            });
        }
    }
}

impl Default for Design {
    fn default() -> Self {
        Self::new()
    }
}
