use brammap_netlist::{Cell, Design, Instance};
use brammap_pass::{map_memories, parse_rules};

// one write and three read ports against a primitive with a single read
// port per layer: the pass has to duplicate the primitive twice
#[test]
fn test_read_port_duplication() {
    let mut design: Design = concat!(
        "%0:1 = input \"clk\"\n",
        "%1:4 = input \"wa\"\n",
        "%5:8 = input \"wd\"\n",
        "%13:1 = input \"we\"\n",
        "%14:4 = input \"ra0\"\n",
        "%18:4 = input \"ra1\"\n",
        "%22:4 = input \"ra2\"\n",
        "%26:24 = memory depth=#16 width=#8 {\n",
        "  write addr=%1:4 data=%5:8 mask=%13*8 clk=%0\n",
        "  read addr=%14:4 clk=%0\n",
        "  read addr=%18:4 clk=%0\n",
        "  read addr=%22:4 clk=%0\n",
        "}\n",
        "%50:0 = output \"rd0\" %26+0:8\n",
        "%51:0 = output \"rd1\" %26+8:8\n",
        "%52:0 = output \"rd2\" %26+16:8\n",
    )
    .parse()
    .unwrap();
    let rules = parse_rules(concat!(
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
    .unwrap();
    map_memories(&mut design, &rules, None).unwrap();
    design.validate();

    let clk = design
        .iter_cells()
        .find_map(|(index, cell)| match cell {
            Cell::Input(name, _) if name == "clk" => Some(design.cell_output(index).unwrap_net()),
            _ => None,
        })
        .unwrap();
    let read_addrs: Vec<_> = (0..3)
        .map(|port| {
            design
                .iter_cells()
                .find_map(|(index, cell)| match cell {
                    Cell::Input(name, _) if *name == format!("ra{}", port) => Some(design.cell_output(index)),
                    _ => None,
                })
                .unwrap()
        })
        .collect();

    let found: Vec<(brammap_netlist::CellIndex, &Instance)> = design
        .iter_cells()
        .filter_map(|(index, cell)| match cell {
            Cell::Other(instance) => Some((index, instance)),
            _ => None,
        })
        .collect();
    assert_eq!(found.len(), 3);

    // every duplicate layer repeats the write wiring and shares the write
    // clock pin
    for (dupidx, (_, instance)) in found.iter().enumerate() {
        assert_eq!(instance.kind, "R1");
        assert_eq!(instance.inputs["CLK1"].unwrap_net(), clk);
        assert_eq!(instance.inputs["A1EN"].len(), 1);
        assert_eq!(instance.inputs["B1ADDR"], read_addrs[dupidx]);
        assert_eq!(instance.inputs["A1DATA"], found[0].1.inputs["A1DATA"]);
        assert_eq!(instance.inputs["A1ADDR"], found[0].1.inputs["A1ADDR"]);
    }

    // each memory read port is carried by exactly one layer
    for port in 0..3 {
        let value = design
            .iter_cells()
            .find_map(|(_, cell)| match cell {
                Cell::Output(name, value) if *name == format!("rd{}", port) => Some(value.clone()),
                _ => None,
            })
            .unwrap();
        let (cell, _) = design.find_cell(value[0]).unwrap();
        assert_eq!(cell, found[port].0);
        for net in value.iter() {
            assert_eq!(design.find_cell(net).unwrap().0, cell);
        }
    }
}
