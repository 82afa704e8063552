use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use crate::{Cell, ControlNet, Design, Net, Value};

#[derive(Debug)]
pub enum NotIsomorphic {
    NoOutputLeft(String),
    NoOutputRight(String),
    OutputSizeMismatch(String),
    ValueSizeMismatch(Value, Value),
    NetMismatch(Net, Net),
}

impl Display for NotIsomorphic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotIsomorphic::NoOutputLeft(name) => write!(f, "output {:?} is missing in the left design", name),
            NotIsomorphic::NoOutputRight(name) => write!(f, "output {:?} is missing in the right design", name),
            NotIsomorphic::OutputSizeMismatch(name) => write!(f, "size of output {:?} does not match", name),
            NotIsomorphic::ValueSizeMismatch(value_l, value_r) => {
                write!(f, "sizes of values {:?} and {:?} do not match", value_l, value_r)
            }
            NotIsomorphic::NetMismatch(net_l, net_r) => write!(f, "nets {} and {} are not isomorphic", net_l, net_r),
        }
    }
}

fn queue_vals(queue: &mut BTreeSet<(Net, Net)>, val_l: &Value, val_r: &Value) -> Result<(), NotIsomorphic> {
    if val_l.len() != val_r.len() {
        return Err(NotIsomorphic::ValueSizeMismatch(val_l.clone(), val_r.clone()));
    }
    for (net_l, net_r) in val_l.iter().zip(val_r.iter()) {
        queue.insert((net_l, net_r));
    }
    Ok(())
}

fn queue_control_nets(
    queue: &mut BTreeSet<(Net, Net)>,
    cn_l: ControlNet,
    cn_r: ControlNet,
    at_l: Net,
    at_r: Net,
) -> Result<(), NotIsomorphic> {
    if cn_l.is_positive() != cn_r.is_positive() {
        return Err(NotIsomorphic::NetMismatch(at_l, at_r));
    }
    queue.insert((cn_l.net(), cn_r.net()));
    Ok(())
}

/// Checks that the two designs compute the same thing: starting from the
/// equally-named [`Cell::Output`] cells, the cones of logic must match
/// cell-for-cell up to renumbering.
pub fn isomorphic(lft: &Design, rgt: &Design) -> Result<(), NotIsomorphic> {
    let mut queue: BTreeSet<(Net, Net)> = BTreeSet::new();
    let mut visited: BTreeSet<(Net, Net)> = BTreeSet::new();
    visited.insert((Net::UNDEF, Net::UNDEF));
    visited.insert((Net::ZERO, Net::ZERO));
    visited.insert((Net::ONE, Net::ONE));

    let mut outputs_l = BTreeMap::new();
    for (_, cell) in lft.iter_cells() {
        if let Cell::Output(name, value) = cell {
            outputs_l.insert(name.clone(), value.clone());
        }
    }
    let mut outputs_r = BTreeMap::new();
    for (_, cell) in rgt.iter_cells() {
        if let Cell::Output(name, value) = cell {
            outputs_r.insert(name.clone(), value.clone());
        }
    }
    for (name, value_l) in &outputs_l {
        let Some(value_r) = outputs_r.get(name) else {
            return Err(NotIsomorphic::NoOutputRight(name.clone()));
        };
        if value_l.len() != value_r.len() {
            return Err(NotIsomorphic::OutputSizeMismatch(name.clone()));
        }
        for (net_l, net_r) in value_l.iter().zip(value_r.iter()) {
            queue.insert((net_l, net_r));
        }
    }
    for name in outputs_r.keys() {
        if !outputs_l.contains_key(name) {
            return Err(NotIsomorphic::NoOutputLeft(name.clone()));
        }
    }

    while let Some((net_l, net_r)) = queue.pop_first() {
        if visited.contains(&(net_l, net_r)) {
            continue;
        }
        if net_l.is_const() || net_r.is_const() {
            // matching (const, const) pairs are pre-seeded into visited
            return Err(NotIsomorphic::NetMismatch(net_l, net_r));
        }
        let (cell_l, bit_l) = lft.find_cell(net_l).unwrap();
        let (cell_r, bit_r) = rgt.find_cell(net_r).unwrap();
        let out_l = lft.cell_output(cell_l);
        let out_r = rgt.cell_output(cell_r);
        if bit_l != bit_r || out_l.len() != out_r.len() {
            return Err(NotIsomorphic::NetMismatch(net_l, net_r));
        }
        for (net_l, net_r) in out_l.iter().zip(out_r.iter()) {
            visited.insert((net_l, net_r));
        }
        match (lft.get_cell(cell_l), rgt.get_cell(cell_r)) {
            (Cell::Eq(arg1_l, arg2_l), Cell::Eq(arg1_r, arg2_r)) => {
                queue_vals(&mut queue, arg1_l, arg1_r)?;
                queue_vals(&mut queue, arg2_l, arg2_r)?;
            }
            (Cell::Mux(sel_l, arg1_l, arg2_l), Cell::Mux(sel_r, arg1_r, arg2_r)) => {
                queue.insert((*sel_l, *sel_r));
                queue_vals(&mut queue, arg1_l, arg1_r)?;
                queue_vals(&mut queue, arg2_l, arg2_r)?;
            }
            (Cell::Dff(ff_l), Cell::Dff(ff_r)) => {
                if ff_l.init_value != ff_r.init_value {
                    return Err(NotIsomorphic::NetMismatch(net_l, net_r));
                }
                queue_vals(&mut queue, &ff_l.data, &ff_r.data)?;
                queue_control_nets(&mut queue, ff_l.clock, ff_r.clock, net_l, net_r)?;
                queue_control_nets(&mut queue, ff_l.enable, ff_r.enable, net_l, net_r)?;
            }
            (Cell::Memory(mem_l), Cell::Memory(mem_r)) => {
                if mem_l.depth != mem_r.depth
                    || mem_l.width != mem_r.width
                    || mem_l.init_value != mem_r.init_value
                    || mem_l.write_ports.len() != mem_r.write_ports.len()
                    || mem_l.read_ports.len() != mem_r.read_ports.len()
                {
                    return Err(NotIsomorphic::NetMismatch(net_l, net_r));
                }
                for (port_l, port_r) in mem_l.write_ports.iter().zip(mem_r.write_ports.iter()) {
                    queue_vals(&mut queue, &port_l.addr, &port_r.addr)?;
                    queue_vals(&mut queue, &port_l.data, &port_r.data)?;
                    queue_vals(&mut queue, &port_l.mask, &port_r.mask)?;
                    match (port_l.clock, port_r.clock) {
                        (None, None) => (),
                        (Some(cn_l), Some(cn_r)) => queue_control_nets(&mut queue, cn_l, cn_r, net_l, net_r)?,
                        _ => return Err(NotIsomorphic::NetMismatch(net_l, net_r)),
                    }
                }
                for (port_l, port_r) in mem_l.read_ports.iter().zip(mem_r.read_ports.iter()) {
                    if port_l.transparent != port_r.transparent {
                        return Err(NotIsomorphic::NetMismatch(net_l, net_r));
                    }
                    queue_vals(&mut queue, &port_l.addr, &port_r.addr)?;
                    match (port_l.clock, port_r.clock) {
                        (None, None) => (),
                        (Some(cn_l), Some(cn_r)) => queue_control_nets(&mut queue, cn_l, cn_r, net_l, net_r)?,
                        _ => return Err(NotIsomorphic::NetMismatch(net_l, net_r)),
                    }
                }
            }
            (Cell::Other(inst_l), Cell::Other(inst_r)) => {
                if inst_l.kind != inst_r.kind || inst_l.params != inst_r.params || inst_l.outputs != inst_r.outputs {
                    return Err(NotIsomorphic::NetMismatch(net_l, net_r));
                }
                if inst_l.inputs.len() != inst_r.inputs.len() {
                    return Err(NotIsomorphic::NetMismatch(net_l, net_r));
                }
                for (name, value_l) in &inst_l.inputs {
                    let Some(value_r) = inst_r.inputs.get(name) else {
                        return Err(NotIsomorphic::NetMismatch(net_l, net_r));
                    };
                    queue_vals(&mut queue, value_l, value_r)?;
                }
            }
            (Cell::Input(name_l, _), Cell::Input(name_r, _)) => {
                if name_l != name_r {
                    return Err(NotIsomorphic::NetMismatch(net_l, net_r));
                }
            }
            _ => return Err(NotIsomorphic::NetMismatch(net_l, net_r)),
        }
    }
    Ok(())
}

#[macro_export]
macro_rules! assert_isomorphic {
    ( $lft:ident, $rgt:ident ) => {
        if let Err(error) = $crate::isomorphic(&$lft, &$rgt) {
            panic!("{}\nleft design:\n{}\nright design:\n{}", error, $lft, $rgt);
        }
    };
}
