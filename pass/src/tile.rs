use std::collections::BTreeMap;

use brammap_netlist::{CellIndex, Const, ControlNet, Design, FlipFlop, Instance, Memory, Net, Value};
use indexmap::IndexMap;

use crate::{Assignment, Bram};

// grid_a as a constant for the extra-address comparator, truncated to the
// width of the extra address bits
fn row_select(grid_a: usize, width: usize) -> Const {
    Const::from_iter((0..width).map(|bit| (bit < usize::BITS as usize && (grid_a >> bit) & 1 != 0).into()))
}

/// Replaces the memory cell with a `grid_d` x `grid_a` x `dup_count` grid of
/// primitive instances wired according to `assignment`, gluing them together
/// with address comparators, enable masks, and read-data multiplexers.
///
/// `output` is the output value of the memory cell being replaced.
pub fn tile_memory(
    design: &mut Design,
    index: CellIndex,
    memory: &Memory,
    output: &Value,
    bram: &Bram,
    assignment: &Assignment,
) {
    // a read-data bit of the memory that nothing consumes does not need a
    // primitive output bit either; collect the set of nets in use up front
    let mut used_nets = std::collections::BTreeSet::new();
    for (cell_index, cell) in design.iter_cells() {
        if cell_index == index {
            continue;
        }
        cell.visit(|net| {
            used_nets.insert(net);
        });
    }

    // for each pruned slice of memory read data: the one-hot row selects
    // and the primitive data outputs accumulated across the depth rows
    let mut dout_cache: IndexMap<Value, (Vec<Net>, Value)> = IndexMap::new();

    let grid_d_count = memory.width.div_ceil(bram.dbits);
    let grid_a_count = memory.depth.div_ceil(1 << bram.abits);

    for grid_d in 0..grid_d_count {
        for grid_a in 0..grid_a_count {
            for dupidx in 0..assignment.dup_count {
                let mut instance = Instance::new(&bram.name);
                let mut clocks: BTreeMap<usize, Net> = BTreeMap::new();
                // (pruned memory-side data, pruned offsets, output range
                // start, latched row select) for every read port wired here
                let mut reads: Vec<(Value, Vec<usize>, usize, Option<Net>)> = vec![];

                for pi in assignment.port_infos.iter().filter(|pi| pi.dupidx == dupidx) {
                    let prefix = pi.name();

                    // a real clock signal wins over the placeholder left by
                    // unmapped ports of the same clock group
                    if pi.clocks != 0 && (!clocks.contains_key(&pi.clocks) || pi.sig_clock.is_some()) {
                        clocks.insert(pi.clocks, pi.sig_clock.unwrap_or(Net::ZERO));
                    }

                    let mut addr_ok = None;
                    if pi.sig_addr.len() > bram.abits {
                        let extra_addr = pi.sig_addr.slice(bram.abits..);
                        let select = row_select(grid_a, extra_addr.len());
                        addr_ok = Some(design.add_eq(extra_addr, Value::from(select)));
                    }

                    if pi.enable != 0 {
                        let mut sig_en =
                            pi.sig_en.zext((grid_d + 1) * pi.enable).slice(grid_d * pi.enable..);
                        if let Some(addr_ok) = addr_ok {
                            sig_en = design.add_mux(addr_ok, sig_en.clone(), Value::zero(sig_en.len()));
                        }
                        instance.add_input(format!("{}EN", prefix), sig_en);
                    }

                    let sig_data = pi.sig_data.zext((grid_d + 1) * bram.dbits).slice(grid_d * bram.dbits..);

                    if pi.wrmode == 1 {
                        instance.add_input(format!("{}DATA", prefix), sig_data);
                    } else {
                        let range = instance.add_output(format!("{}DATA", prefix), bram.dbits);
                        let mut kept_data = Value::new();
                        let mut kept_offsets = vec![];
                        for (offset, net) in sig_data.iter().enumerate() {
                            if !net.is_const() && used_nets.contains(&net) {
                                kept_data.push(net);
                                kept_offsets.push(offset);
                            }
                        }
                        // a clocked read port sees its row select through
                        // the same register delay as the primitive's data
                        let addr_ok_q = match (addr_ok, pi.sig_clock) {
                            (Some(addr_ok), Some(sig_clock)) if pi.clocks != 0 => {
                                let clock = match pi.effective_clkpol {
                                    true => ControlNet::Pos(sig_clock),
                                    false => ControlNet::Neg(sig_clock),
                                };
                                Some(design.add_dff(FlipFlop::new(Value::from(addr_ok), clock)).unwrap_net())
                            }
                            _ => addr_ok,
                        };
                        reads.push((kept_data, kept_offsets, range.start, addr_ok_q));
                    }

                    instance.add_input(format!("{}ADDR", prefix), pi.sig_addr.zext(bram.abits));
                }

                for (&clocks_id, &net) in &clocks {
                    instance.add_input(format!("CLK{}", (clocks_id - 1) % assignment.clocks_max + 1), net);
                }
                for (&clkpol_id, &polarity) in &assignment.clock_polarities {
                    if clkpol_id > 1 {
                        instance
                            .add_param(format!("CLKPOL{}", (clkpol_id - 1) % assignment.clkpol_max + 1), polarity);
                    }
                }

                log::debug!(
                    "    creating {} cell at grid position <{} {} {}>",
                    bram.name,
                    grid_d,
                    grid_a,
                    dupidx
                );
                let instance_output = design.add_other(instance);

                for (kept_data, kept_offsets, range_start, addr_ok_q) in reads {
                    let dout =
                        Value::from_iter(kept_offsets.iter().map(|&offset| instance_output[range_start + offset]));
                    let entry = dout_cache.entry(kept_data).or_default();
                    if let Some(addr_ok_q) = addr_ok_q {
                        entry.0.push(addr_ok_q);
                    }
                    entry.1.extend(dout.iter());
                }
            }
        }
    }

    // fan the accumulated primitive outputs back into the memory's read
    // data: a plain connection when a single row drives it, otherwise a
    // one-hot multiplexer over the row selects with a don't-care default
    for (sig_data, (selects, douts)) in dout_cache {
        if sig_data.is_empty() {
            continue;
        }
        if selects.is_empty() {
            assert_eq!(sig_data.len(), douts.len());
            design.replace_value(&sig_data, &douts);
        } else {
            assert_eq!(sig_data.len() * selects.len(), douts.len());
            let width = sig_data.len();
            let mut mux = Value::undef(width);
            for (row, &select) in selects.iter().enumerate() {
                mux = design.add_mux(select, douts.slice(row * width..(row + 1) * width), mux);
            }
            design.replace_value(&sig_data, &mux);
        }
    }

    design.remove_cell(index);
}
