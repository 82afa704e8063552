use std::collections::{BTreeMap, BTreeSet};

use brammap_netlist::{ControlNet, Memory, Net, Value};

use crate::Bram;

/// One physical port of the primitive, flattened out of the descriptor's
/// group vectors, together with the mapping state of the current attempt.
///
/// The first eight fields are the port's shape and never change except for
/// `clocks`/`clkpol` renumbering and `dupidx` when the primitive is
/// duplicated; the rest is scratch owned by the attempt.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub group: usize,
    pub index: usize,
    pub dupidx: usize,
    pub wrmode: usize,
    pub enable: usize,
    pub transp: usize,
    pub clocks: usize,
    pub clkpol: usize,

    /// Index of the memory port this slot carries, if any.
    pub mapped_port: Option<usize>,
    pub sig_clock: Option<Net>,
    pub effective_clkpol: bool,
    pub sig_addr: Value,
    pub sig_data: Value,
    /// One bit per write-enable lane, extracted from the memory port's
    /// per-bit mask.
    pub sig_en: Value,
}

impl PortInfo {
    /// The pin-name prefix of this port on the primitive: group letter plus
    /// 1-based index within the group, e.g. `B2`.
    pub fn name(&self) -> String {
        format!("{}{}", (b'A' + self.group as u8) as char, self.index + 1)
    }

    fn clear_read_state(&mut self) {
        self.mapped_port = None;
        self.sig_clock = None;
        self.effective_clkpol = false;
        self.sig_addr = Value::EMPTY;
        self.sig_data = Value::EMPTY;
        self.sig_en = Value::EMPTY;
    }
}

/// Expands a descriptor into one record per physical port, groups in order,
/// ports within a group in order. Groups past the end of the `ports` vector
/// contribute nothing; other missing vector entries read as 0.
pub fn port_infos(bram: &Bram) -> Vec<PortInfo> {
    let mut infos = vec![];
    for group in 0..bram.groups.min(bram.ports.len()) {
        for index in 0..bram.ports[group] {
            infos.push(PortInfo {
                group,
                index,
                dupidx: 0,
                wrmode: Bram::group_value(&bram.wrmode, group),
                enable: Bram::group_value(&bram.enable, group),
                transp: Bram::group_value(&bram.transp, group),
                clocks: Bram::group_value(&bram.clocks, group),
                clkpol: Bram::group_value(&bram.clkpol, group),
                mapped_port: None,
                sig_clock: None,
                effective_clkpol: false,
                sig_addr: Value::EMPTY,
                sig_data: Value::EMPTY,
                sig_en: Value::EMPTY,
            });
        }
    }
    infos
}

/// A successful port assignment: which primitive port carries which memory
/// port, across how many duplicate layers, and the clock bindings the
/// wiring stage must honor.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub port_infos: Vec<PortInfo>,
    /// Clock group id -> (clock signal, polarity) bound while assigning.
    pub clock_domains: BTreeMap<usize, (Net, bool)>,
    /// Polarity slot id -> polarity. Slots 0 and 1 are fixed (negedge and
    /// posedge); higher slots are configurable and bound on first use.
    pub clock_polarities: BTreeMap<usize, bool>,
    pub dup_count: usize,
    pub clocks_max: usize,
    pub clkpol_max: usize,
}

/// The canonical clock domain of a memory port: `(signal, polarity)`, with
/// unclocked ports folded into `(constant one, negedge)`.
fn clock_domain(clock: Option<ControlNet>) -> (Net, bool) {
    match clock {
        Some(clock) => (clock.net(), clock.is_positive()),
        None => (Net::ONE, false),
    }
}

fn domain_name(clock: Option<ControlNet>) -> String {
    match clock {
        Some(clock) => format!("{}{}", if clock.is_positive() { "" } else { "!" }, clock.net()),
        None => "~async~".to_owned(),
    }
}

/// Checks a memory port's clocking against a primitive port slot and the
/// bindings made so far. Logs and returns false on the first mismatch.
fn clocks_compatible(
    pi: &PortInfo,
    clocked: bool,
    clkdom: (Net, bool),
    clock_domains: &BTreeMap<usize, (Net, bool)>,
    clock_polarities: &BTreeMap<usize, bool>,
    label: &str,
) -> bool {
    if !clocked {
        if pi.clocks != 0 {
            log::trace!("      bram port {} has incompatible clock type", label);
            return false;
        }
        return true;
    }
    if pi.clocks == 0 {
        log::trace!("      bram port {} has incompatible clock type", label);
        return false;
    }
    if let Some(&bound) = clock_domains.get(&pi.clocks) {
        if bound != clkdom {
            log::trace!("      bram port {} is in a different clock domain", label);
            return false;
        }
    }
    if let Some(&bound) = clock_polarities.get(&pi.clkpol) {
        if bound != clkdom.1 {
            log::trace!("      bram port {} has incompatible clock polarity", label);
            return false;
        }
    }
    true
}

/// Collapses a per-bit write-enable mask into one enable per lane of
/// `dbits / enable` data bits. Every bit of a lane must share the lane's
/// enable signal; with no enable pins at all (`enable == 0`), the port only
/// accepts writes that are unconditionally enabled. Returns `None` when the
/// mask does not have that shape.
fn lane_enables(mask: &Value, width: usize, dbits: usize, enable: usize) -> Option<Value> {
    let mut sig_en = Value::new();
    let mut lane_bit = Net::ONE;
    for bit in 0..width {
        if enable != 0 && bit % (dbits / enable) == 0 {
            lane_bit = mask[bit];
            sig_en.push(lane_bit);
        }
        if lane_bit != mask[bit] {
            return None;
        }
    }
    Some(sig_en)
}

fn bind_clock(
    pi: &mut PortInfo,
    clocked: bool,
    clkdom: (Net, bool),
    clock_domains: &mut BTreeMap<usize, (Net, bool)>,
    clock_polarities: &mut BTreeMap<usize, bool>,
) {
    if clocked {
        clock_domains.insert(pi.clocks, clkdom);
        clock_polarities.insert(pi.clkpol, clkdom.1);
        pi.sig_clock = Some(clkdom.0);
        pi.effective_clkpol = clkdom.1;
    }
}

/// Assigns every memory port to a primitive port slot, duplicating the
/// primitive as needed to fit all read ports. Pure: the design is not
/// consulted or modified, so a `None` (this descriptor cannot carry this
/// memory) leaves no trace.
///
/// `output` is the output value of the memory cell, holding the read data.
pub fn assign_ports(memory: &Memory, output: &Value, bram: &Bram) -> Option<Assignment> {
    let mut port_infos = port_infos(bram);
    let mut dup_count = 1;

    let mut clock_domains: BTreeMap<usize, (Net, bool)> = BTreeMap::new();
    let mut clock_polarities: BTreeMap<usize, bool> = BTreeMap::new();
    clock_polarities.insert(0, false);
    clock_polarities.insert(1, true);

    // clock and polarity groups shared with a write port must keep their
    // ids when duplicating, so that every layer sees the write clock
    let mut clocks_wr_ports: BTreeSet<usize> = BTreeSet::new();
    let mut clkpol_wr_ports: BTreeSet<usize> = BTreeSet::new();
    let mut clocks_max = 0;
    let mut clkpol_max = 0;
    for pi in &port_infos {
        if pi.wrmode != 0 {
            clocks_wr_ports.insert(pi.clocks);
            if pi.clkpol > 1 {
                clkpol_wr_ports.insert(pi.clkpol);
            }
        }
        clocks_max = clocks_max.max(pi.clocks);
        clkpol_max = clkpol_max.max(pi.clkpol);
    }

    // write ports share one forward cursor: slots skipped for one memory
    // port are never offered to a later one
    let mut cursor = 0;
    for (port_index, write_port) in memory.write_ports.iter().enumerate() {
        let clocked = write_port.clock.is_some();
        let clkdom = clock_domain(write_port.clock);
        log::trace!("    write port #{} is in clock domain {}", port_index, domain_name(write_port.clock));

        let mut mapped = false;
        while cursor < port_infos.len() {
            let pi = &port_infos[cursor];
            if pi.wrmode != 1 {
                cursor += 1;
                continue;
            }
            let label = pi.name();
            if !clocks_compatible(pi, clocked, clkdom, &clock_domains, &clock_polarities, &label) {
                cursor += 1;
                continue;
            }
            let Some(sig_en) = lane_enables(&write_port.mask, memory.width, bram.dbits, pi.enable) else {
                log::trace!("      bram port {} has incompatible enable structure", label);
                cursor += 1;
                continue;
            };

            log::trace!("      mapped to bram port {}", label);
            let pi = &mut port_infos[cursor];
            pi.mapped_port = Some(port_index);
            bind_clock(pi, clocked, clkdom, &mut clock_domains, &mut clock_polarities);
            pi.sig_en = sig_en;
            pi.sig_addr = write_port.addr.clone();
            pi.sig_data = write_port.data.clone();
            cursor += 1;
            mapped = true;
            break;
        }
        if !mapped {
            log::trace!("      failed to map write port #{}", port_index);
            return None;
        }
    }

    // the read phase may duplicate the primitive and rescan; it restores
    // the clock tables to this snapshot each time
    let backup_clock_domains = clock_domains.clone();
    let backup_clock_polarities = clock_polarities.clone();

    let mut grow_read_ports_cursor: Option<usize> = None;
    let mut try_growing_more_read_ports = false;

    let mut port_index = 0;
    while port_index < memory.read_ports.len() {
        let read_port = &memory.read_ports[port_index];
        let clocked = read_port.clock.is_some();
        let clkdom = clock_domain(read_port.clock);
        log::trace!("    read port #{} is in clock domain {}", port_index, domain_name(read_port.clock));

        let mut mapped = false;
        for slot in 0..port_infos.len() {
            let pi = &port_infos[slot];
            if pi.wrmode != 0 || pi.mapped_port.is_some() {
                continue;
            }
            let label = format!("{}.{}", pi.name(), pi.dupidx + 1);
            if !clocks_compatible(pi, clocked, clkdom, &clock_domains, &clock_polarities, &label) {
                continue;
            }

            log::trace!("      mapped to bram port {}", label);
            let pi = &mut port_infos[slot];
            pi.mapped_port = Some(port_index);
            bind_clock(pi, clocked, clkdom, &mut clock_domains, &mut clock_polarities);
            pi.sig_addr = read_port.addr.clone();
            pi.sig_data = output.slice(memory.read_port_output_slice(port_index));
            if grow_read_ports_cursor.is_none() || grow_read_ports_cursor < Some(port_index) {
                grow_read_ports_cursor = Some(port_index);
                try_growing_more_read_ports = true;
            }
            mapped = true;
            break;
        }
        if mapped {
            port_index += 1;
            continue;
        }

        log::trace!("      failed to map read port #{}", port_index);
        if !try_growing_more_read_ports {
            return None;
        }

        // duplicate the whole primitive: each slot of the newest layer gets
        // a copy with fresh read clock/polarity ids (write-bound ids are
        // kept so the layers share the write clock pin), all read mapping
        // state is discarded, and the scan restarts at read port #0
        log::trace!("    growing more read ports by duplicating bram cells");
        let mut new_port_infos = Vec::with_capacity(port_infos.len() * 2);
        for mut pi in port_infos {
            if pi.wrmode == 0 {
                pi.clear_read_state();
            }
            new_port_infos.push(pi.clone());
            if pi.dupidx == dup_count - 1 {
                if pi.clocks != 0 && !clocks_wr_ports.contains(&pi.clocks) {
                    pi.clocks += clocks_max;
                }
                if pi.clkpol > 1 && !clkpol_wr_ports.contains(&pi.clkpol) {
                    pi.clkpol += clkpol_max;
                }
                pi.dupidx += 1;
                new_port_infos.push(pi);
            }
        }
        port_infos = new_port_infos;
        try_growing_more_read_ports = false;
        clock_domains = backup_clock_domains.clone();
        clock_polarities = backup_clock_polarities.clone();
        dup_count += 1;
        port_index = 0;
    }

    Some(Assignment { port_infos, clock_domains, clock_polarities, dup_count, clocks_max, clkpol_max })
}

#[cfg(test)]
mod test {
    use brammap_netlist::{Const, ControlNet, Design, Memory, MemoryReadPort, MemoryWritePort, Net, Value};

    use super::{assign_ports, lane_enables, port_infos};
    use crate::{parse_rules, Bram, Rules};

    fn simple_rules() -> Rules {
        parse_rules(concat!(
            "bram R1\n",
            "  abits 4\n",
            "  dbits 8\n",
            "  groups 2\n",
            "  ports  1 1\n",
            "  wrmode 1 0\n",
            "  enable 1 0\n",
            "  clocks 1 1\n",
            "  clkpol 1 1\n",
            "endbram\n",
        ))
        .unwrap()
    }

    fn test_memory(design: &mut Design, rd_ports: usize) -> (Memory, Value, Net) {
        let clk = design.add_input("clk", 1).unwrap_net();
        let wa = design.add_input("wa", 4);
        let wd = design.add_input("wd", 8);
        let we = design.add_input("we", 1);
        let memory = Memory {
            depth: 16,
            width: 8,
            init_value: Const::undef(16 * 8),
            write_ports: vec![MemoryWritePort {
                addr: wa,
                data: wd,
                mask: we.repeat(8),
                clock: Some(ControlNet::Pos(clk)),
            }],
            read_ports: (0..rd_ports)
                .map(|index| {
                    let ra = design.add_input(format!("ra{}", index), 4);
                    MemoryReadPort::clocked(ra, ControlNet::Pos(clk))
                })
                .collect(),
        };
        let output = design.add_memory(memory.clone());
        for index in 0..rd_ports {
            design.add_output(format!("rd{}", index), output.slice(index * 8..(index + 1) * 8));
        }
        (memory, output, clk)
    }

    #[test]
    fn test_port_infos_flattening() {
        let bram = Bram {
            groups: 3,
            ports: vec![1, 2],
            wrmode: vec![1],
            clocks: vec![1, 2],
            ..Bram::default()
        };
        let infos = port_infos(&bram);
        // the third group has no ports entry and contributes nothing
        assert_eq!(infos.len(), 3);
        assert_eq!((infos[0].group, infos[0].index, infos[0].wrmode, infos[0].clocks), (0, 0, 1, 1));
        assert_eq!((infos[1].group, infos[1].index, infos[1].wrmode, infos[1].clocks), (1, 0, 0, 2));
        assert_eq!((infos[2].group, infos[2].index, infos[2].wrmode, infos[2].clocks), (1, 1, 0, 2));
        assert_eq!(infos[1].name(), "B1");
        assert_eq!(infos[2].name(), "B2");
    }

    #[test]
    fn test_lane_enables() {
        let mut design = Design::new();
        let en = design.add_input("en", 2);
        // two 4-bit lanes of an 8-bit word
        let mask = en.slice(0..1).repeat(4).concat(en.slice(1..2).repeat(4));
        let lanes = lane_enables(&mask, 8, 8, 2).unwrap();
        assert_eq!(lanes, Value::from_iter([en[0], en[1]]));
        // inconsistent bit inside the first lane
        let bad = Value::from(en[1]).concat(en.slice(0..1).repeat(3)).concat(en.slice(1..2).repeat(4));
        assert!(lane_enables(&bad, 8, 8, 2).is_none());
        // no enable pins: only constant-one masks are accepted
        assert!(lane_enables(&Value::from(Const::ones(8)), 8, 8, 0).is_some());
        assert!(lane_enables(&mask, 8, 8, 0).is_none());
    }

    #[test]
    fn test_simple_assignment() {
        let mut design = Design::new();
        let (memory, output, clk) = test_memory(&mut design, 1);
        let rules = simple_rules();
        let assignment = assign_ports(&memory, &output, &rules.brams["R1"]).unwrap();
        assert_eq!(assignment.dup_count, 1);
        assert_eq!(assignment.port_infos.len(), 2);
        assert_eq!(assignment.port_infos[0].mapped_port, Some(0));
        assert_eq!(assignment.port_infos[1].mapped_port, Some(0));
        assert_eq!(assignment.clock_domains[&1], (clk, true));
        assert_eq!(assignment.clock_polarities[&1], true);
    }

    #[test]
    fn test_read_duplication_is_minimal() {
        let mut design = Design::new();
        let (memory, output, clk) = test_memory(&mut design, 3);
        let rules = simple_rules();
        let assignment = assign_ports(&memory, &output, &rules.brams["R1"]).unwrap();
        assert_eq!(assignment.dup_count, 3);
        // every layer's write port repeats the write wiring, and shares the
        // write-bound clock group id
        let writes: Vec<_> = assignment.port_infos.iter().filter(|pi| pi.wrmode == 1).collect();
        assert_eq!(writes.len(), 3);
        for pi in &writes {
            assert_eq!(pi.mapped_port, Some(0));
            assert_eq!(pi.clocks, 1);
            assert_eq!(pi.sig_clock, Some(clk));
        }
        // each read port lands on its own layer
        let mut reads: Vec<_> = assignment.port_infos.iter().filter(|pi| pi.wrmode == 0).collect();
        reads.sort_by_key(|pi| pi.dupidx);
        assert_eq!(
            Vec::from_iter(reads.iter().map(|pi| (pi.dupidx, pi.mapped_port))),
            vec![(0, Some(0)), (1, Some(1)), (2, Some(2))]
        );
    }

    #[test]
    fn duplication_rederives_earlier_bindings() {
        // after each duplication the scan restarts from read port #0; the
        // bindings it re-creates must match the ones that were discarded
        let mut design = Design::new();
        let (memory, output, _) = test_memory(&mut design, 2);
        let rules = simple_rules();
        let assignment = assign_ports(&memory, &output, &rules.brams["R1"]).unwrap();
        assert_eq!(assignment.dup_count, 2);
        let read0 = assignment
            .port_infos
            .iter()
            .find(|pi| pi.wrmode == 0 && pi.mapped_port == Some(0))
            .unwrap();
        assert_eq!(read0.dupidx, 0);
        assert_eq!(read0.sig_data, output.slice(0..8));
        assert_eq!(read0.sig_addr, memory.read_ports[0].addr);
    }

    #[test]
    fn test_write_clock_conflict() {
        // two write ports on different clocks, but the descriptor shares
        // one clock group across all its ports
        let mut design = Design::new();
        let clk_a = design.add_input("clk_a", 1).unwrap_net();
        let clk_b = design.add_input("clk_b", 1).unwrap_net();
        let wa = design.add_input("wa", 8);
        let wd = design.add_input("wd", 16);
        let memory = Memory {
            depth: 16,
            width: 8,
            init_value: Const::undef(16 * 8),
            write_ports: vec![
                MemoryWritePort {
                    addr: wa.slice(0..4),
                    data: wd.slice(0..8),
                    mask: Value::from(Const::ones(8)),
                    clock: Some(ControlNet::Pos(clk_a)),
                },
                MemoryWritePort {
                    addr: wa.slice(4..8),
                    data: wd.slice(8..16),
                    mask: Value::from(Const::ones(8)),
                    clock: Some(ControlNet::Pos(clk_b)),
                },
            ],
            read_ports: vec![],
        };
        let output = design.add_memory(memory.clone());
        let rules = parse_rules(concat!(
            "bram R2\n",
            "  abits 4\n",
            "  dbits 8\n",
            "  groups 2\n",
            "  ports  1 1\n",
            "  wrmode 1 1\n",
            "  enable 1 1\n",
            "  clocks 1 1\n",
            "  clkpol 1 1\n",
            "endbram\n",
        ))
        .unwrap();
        assert!(assign_ports(&memory, &output, &rules.brams["R2"]).is_none());
    }

    #[test]
    fn test_polarity_slot_conflict() {
        // fixed posedge slot (clkpol 1) cannot take a negedge write port
        let mut design = Design::new();
        let clk = design.add_input("clk", 1).unwrap_net();
        let wa = design.add_input("wa", 4);
        let wd = design.add_input("wd", 8);
        let memory = Memory {
            depth: 16,
            width: 8,
            init_value: Const::undef(16 * 8),
            write_ports: vec![MemoryWritePort {
                addr: wa,
                data: wd,
                mask: Value::from(Const::ones(8)),
                clock: Some(ControlNet::Neg(clk)),
            }],
            read_ports: vec![],
        };
        let output = design.add_memory(memory.clone());
        let rules = simple_rules();
        assert!(assign_ports(&memory, &output, &rules.brams["R1"]).is_none());

        // a configurable polarity slot (clkpol 2) takes it
        let rules = parse_rules(concat!(
            "bram R3\n",
            "  abits 4\n",
            "  dbits 8\n",
            "  groups 2\n",
            "  ports  1 1\n",
            "  wrmode 1 0\n",
            "  enable 1 0\n",
            "  clocks 1 1\n",
            "  clkpol 2 2\n",
            "endbram\n",
        ))
        .unwrap();
        let assignment = assign_ports(&memory, &output, &rules.brams["R3"]).unwrap();
        assert_eq!(assignment.clock_polarities[&2], false);
    }

    #[test]
    fn test_async_read_requires_unclocked_slot() {
        let mut design = Design::new();
        let ra = design.add_input("ra", 4);
        let memory = Memory {
            depth: 16,
            width: 8,
            init_value: Const::undef(16 * 8),
            write_ports: vec![],
            read_ports: vec![MemoryReadPort::asynchronous(ra)],
        };
        let output = design.add_memory(memory.clone());
        // clocked read slot: incompatible with an asynchronous read port
        let rules = simple_rules();
        assert!(assign_ports(&memory, &output, &rules.brams["R1"]).is_none());
        // unclocked read slot: fits
        let rules = parse_rules(concat!(
            "bram R4\n",
            "  abits 4\n",
            "  dbits 8\n",
            "  groups 1\n",
            "  ports  1\n",
            "  wrmode 0\n",
            "  clocks 0\n",
            "endbram\n",
        ))
        .unwrap();
        let assignment = assign_ports(&memory, &output, &rules.brams["R4"]).unwrap();
        assert_eq!(assignment.port_infos[0].mapped_port, Some(0));
        assert!(assignment.clock_domains.is_empty());
    }
}
