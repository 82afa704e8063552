use brammap_netlist::{assert_isomorphic, Cell, Const, ControlNet, Design, FlipFlop, Instance, Value};
use brammap_pass::{map_memories, parse_rules, Rules};

fn rules_16x8() -> Rules {
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
        "match R1\n",
        "endmatch\n",
    ))
    .unwrap()
}

fn instances(design: &Design) -> Vec<&Instance> {
    design
        .iter_cells()
        .filter_map(|(_, cell)| match cell {
            Cell::Other(instance) => Some(instance),
            _ => None,
        })
        .collect()
}

fn memory_count(design: &Design) -> usize {
    design.iter_cells().filter(|(_, cell)| matches!(cell, Cell::Memory(_))).count()
}

#[test]
fn test_simple_fit() {
    // 16x8 with one write and one read port drops into a single R1
    let mut design: Design = concat!(
        "%0:1 = input \"clk\"\n",
        "%1:4 = input \"wa\"\n",
        "%5:8 = input \"wd\"\n",
        "%13:1 = input \"we\"\n",
        "%14:4 = input \"ra\"\n",
        "%18:8 = memory depth=#16 width=#8 {\n",
        "  write addr=%1:4 data=%5:8 mask=%13*8 clk=%0\n",
        "  read addr=%14:4 clk=%0\n",
        "}\n",
        "%26:0 = output \"rd\" %18:8\n",
    )
    .parse()
    .unwrap();
    map_memories(&mut design, &rules_16x8(), None).unwrap();
    design.validate();
    assert_eq!(memory_count(&design), 0);

    let mut gold: Design = concat!(
        "%0:1 = input \"clk\"\n",
        "%1:4 = input \"wa\"\n",
        "%5:8 = input \"wd\"\n",
        "%13:1 = input \"we\"\n",
        "%14:4 = input \"ra\"\n",
        "%18:8 = instance \"R1\" {\n",
        "  input \"A1ADDR\" %1:4\n",
        "  input \"A1DATA\" %5:8\n",
        "  input \"A1EN\" %13\n",
        "  input \"B1ADDR\" %14:4\n",
        "  input \"CLK1\" %0\n",
        "  output \"B1DATA\" +0:8\n",
        "}\n",
        "%26:0 = output \"rd\" %18:8\n",
    )
    .parse()
    .unwrap();
    assert_isomorphic!(design, gold);
}

#[test]
fn test_depth_tiling() {
    // 64 words through a 16-word primitive: four depth rows, each gated by
    // an address comparator, with a registered one-hot read mux
    let mut design: Design = concat!(
        "%0:1 = input \"clk\"\n",
        "%1:6 = input \"wa\"\n",
        "%7:8 = input \"wd\"\n",
        "%15:1 = input \"we\"\n",
        "%16:6 = input \"ra\"\n",
        "%22:8 = memory depth=#64 width=#8 {\n",
        "  write addr=%1:6 data=%7:8 mask=%15*8 clk=%0\n",
        "  read addr=%16:6 clk=%0\n",
        "}\n",
        "%30:0 = output \"rd\" %22:8\n",
    )
    .parse()
    .unwrap();
    map_memories(&mut design, &rules_16x8(), None).unwrap();
    design.validate();

    let mut gold = Design::new();
    let clk = gold.add_input("clk", 1).unwrap_net();
    let wa = gold.add_input("wa", 6);
    let wd = gold.add_input("wd", 8);
    let we = gold.add_input("we", 1);
    let ra = gold.add_input("ra", 6);
    let mut rows = vec![];
    for grid_a in 0..4u64 {
        let row = Value::from(Const::from_uint(grid_a, 2));
        let wa_ok = gold.add_eq(wa.slice(4..), row.clone());
        let en = gold.add_mux(wa_ok, &we, Value::zero(1));
        let ra_ok = gold.add_eq(ra.slice(4..), row);
        let ra_ok_q = gold.add_dff(FlipFlop::new(Value::from(ra_ok), ControlNet::Pos(clk))).unwrap_net();
        let mut instance = Instance::new("R1");
        instance.add_input("A1ADDR", wa.slice(0..4));
        instance.add_input("A1DATA", &wd);
        instance.add_input("A1EN", en);
        instance.add_input("B1ADDR", ra.slice(0..4));
        instance.add_input("CLK1", Value::from(clk));
        instance.add_output("B1DATA", 8);
        let dout = gold.add_other(instance);
        rows.push((ra_ok_q, dout));
    }
    let mut mux = Value::undef(8);
    for (select, dout) in rows {
        mux = gold.add_mux(select, dout, mux);
    }
    gold.add_output("rd", mux);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_width_tiling() {
    // a 16-bit word through a 4-bit primitive: one column per nibble, write
    // data sliced per column, read data reassembled by concatenation
    let mut design: Design = concat!(
        "%0:1 = input \"clk\"\n",
        "%1:4 = input \"wa\"\n",
        "%5:16 = input \"wd\"\n",
        "%21:1 = input \"we\"\n",
        "%22:4 = input \"ra\"\n",
        "%26:16 = memory depth=#16 width=#16 {\n",
        "  write addr=%1:4 data=%5:16 mask=%21*16 clk=%0\n",
        "  read addr=%22:4 clk=%0\n",
        "}\n",
        "%42:0 = output \"rd\" %26:16\n",
    )
    .parse()
    .unwrap();
    let rules = parse_rules(concat!(
        "bram R1N\n",
        "  abits 4\n",
        "  dbits 4\n",
        "  groups 2\n",
        "  ports  1 1\n",
        "  wrmode 1 0\n",
        "  enable 1 0\n",
        "  clocks 1 1\n",
        "  clkpol 1 1\n",
        "endbram\n",
        "match R1N\n",
        "endmatch\n",
    ))
    .unwrap();
    map_memories(&mut design, &rules, None).unwrap();
    design.validate();
    assert_eq!(memory_count(&design), 0);

    let found = instances(&design);
    assert_eq!(found.len(), 4);
    let wd = design
        .iter_cells()
        .find_map(|(index, cell)| match cell {
            Cell::Input(name, _) if name == "wd" => Some(design.cell_output(index)),
            _ => None,
        })
        .unwrap();
    for (grid_d, instance) in found.iter().enumerate() {
        assert_eq!(instance.kind, "R1N");
        assert_eq!(instance.inputs["A1DATA"], wd.slice(grid_d * 4..(grid_d + 1) * 4));
        assert_eq!(instance.inputs["A1EN"].len(), 1);
        assert_eq!(instance.outputs["B1DATA"].len(), 4);
    }
    // the read port's data width is covered exactly by the two columns
    let rd = design
        .iter_cells()
        .find_map(|(_, cell)| match cell {
            Cell::Output(name, value) if name == "rd" => Some(value.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(rd.len(), 16);
    for net in rd.iter() {
        let (cell, _) = design.find_cell(net).unwrap();
        assert!(matches!(design.get_cell(cell), Cell::Other(_)));
    }
}

#[test]
fn test_determinism() {
    let text = concat!(
        "%0:1 = input \"clk\"\n",
        "%1:6 = input \"wa\"\n",
        "%7:8 = input \"wd\"\n",
        "%15:1 = input \"we\"\n",
        "%16:6 = input \"ra\"\n",
        "%22:8 = memory depth=#64 width=#8 {\n",
        "  write addr=%1:6 data=%7:8 mask=%15*8 clk=%0\n",
        "  read addr=%16:6 clk=%0\n",
        "}\n",
        "%30:0 = output \"rd\" %22:8\n",
    );
    let rules = rules_16x8();
    let mut first: Design = text.parse().unwrap();
    let mut second: Design = text.parse().unwrap();
    map_memories(&mut first, &rules, None).unwrap();
    map_memories(&mut second, &rules, None).unwrap();
    assert_eq!(format!("{}", first), format!("{}", second));
}
