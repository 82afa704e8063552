use std::fmt::{Display, Formatter, Result};

use crate::{Cell, ControlNet, Design, Net, Trit, Value};

// One printable piece of a value: a run of constant bits, a contiguous
// slice of one cell's output, or a single net repeated.
enum Segment {
    Const(Vec<Trit>),
    Slice { cell: usize, cell_len: usize, offset: usize, len: usize },
    Repeat { net: Net, count: usize },
}

impl Design {
    fn net_place(&self, net: Net) -> Option<(usize, usize, usize)> {
        let (cell, offset) = self.find_cell(net).ok()?;
        Some((cell.0, self.get_cell(cell).output_len(), offset))
    }

    fn segments(&self, value: &Value) -> Vec<Segment> {
        let mut segments: Vec<Segment> = vec![];
        for net in value.iter() {
            if let Some(trit) = net.as_const() {
                if let Some(Segment::Const(trits)) = segments.last_mut() {
                    trits.push(trit);
                } else {
                    segments.push(Segment::Const(vec![trit]));
                }
                continue;
            }
            let (cell, cell_len, offset) = self.net_place(net).expect("net should be driven");
            let mut make_repeat = false;
            match segments.last_mut() {
                Some(Segment::Repeat { net: prev, count }) if *prev == net => {
                    *count += 1;
                    continue;
                }
                Some(Segment::Slice { cell: prev_cell, offset: prev_offset, len, .. }) if *prev_cell == cell => {
                    if *prev_offset + *len == offset {
                        *len += 1;
                        continue;
                    }
                    make_repeat = *len == 1 && *prev_offset == offset;
                }
                _ => (),
            }
            if make_repeat {
                *segments.last_mut().unwrap() = Segment::Repeat { net, count: 2 };
            } else {
                segments.push(Segment::Slice { cell, cell_len, offset, len: 1 });
            }
        }
        segments
    }

    fn write_segment(&self, f: &mut Formatter, segment: &Segment) -> Result {
        match segment {
            Segment::Const(trits) => {
                for trit in trits.iter().rev() {
                    write!(f, "{}", trit)?;
                }
                Ok(())
            }
            Segment::Slice { cell, cell_len, offset, len } => {
                write!(f, "%{}", cell)?;
                if !(*offset == 0 && len == cell_len) {
                    write!(f, "+{}", offset)?;
                }
                if *len > 1 {
                    write!(f, ":{}", len)?;
                }
                Ok(())
            }
            Segment::Repeat { net, count } => {
                self.write_net(f, *net)?;
                write!(f, "*{}", count)
            }
        }
    }

    fn write_net(&self, f: &mut Formatter, net: Net) -> Result {
        match net.as_const() {
            Some(trit) => write!(f, "{}", trit),
            None => {
                let (cell, cell_len, offset) = self.net_place(net).expect("net should be driven");
                if cell_len == 1 {
                    write!(f, "%{}", cell)
                } else {
                    write!(f, "%{}+{}", cell, offset)
                }
            }
        }
    }

    fn write_value(&self, f: &mut Formatter, value: &Value) -> Result {
        let segments = self.segments(value);
        match segments.len() {
            0 => write!(f, "[]"),
            1 => self.write_segment(f, &segments[0]),
            _ => {
                write!(f, "[")?;
                for segment in segments.iter().rev() {
                    write!(f, " ")?;
                    self.write_segment(f, segment)?;
                }
                write!(f, " ]")
            }
        }
    }

    fn write_control_net(&self, f: &mut Formatter, control_net: ControlNet) -> Result {
        if control_net.is_negative() {
            write!(f, "!")?;
        }
        self.write_net(f, control_net.net())
    }
}

impl Display for Design {
    fn fmt(&self, f: &mut Formatter) -> Result {
        for (index, cell) in self.iter_cells() {
            write!(f, "%{}:{} = ", index.0, cell.output_len())?;
            match cell {
                Cell::Eq(arg1, arg2) => {
                    write!(f, "eq ")?;
                    self.write_value(f, arg1)?;
                    write!(f, " ")?;
                    self.write_value(f, arg2)?;
                }
                Cell::Mux(sel, arg1, arg2) => {
                    write!(f, "mux ")?;
                    self.write_net(f, *sel)?;
                    write!(f, " ")?;
                    self.write_value(f, arg1)?;
                    write!(f, " ")?;
                    self.write_value(f, arg2)?;
                }
                Cell::Dff(flip_flop) => {
                    write!(f, "dff ")?;
                    self.write_value(f, &flip_flop.data)?;
                    write!(f, " clk=")?;
                    self.write_control_net(f, flip_flop.clock)?;
                    if flip_flop.has_enable() {
                        write!(f, " en=")?;
                        self.write_control_net(f, flip_flop.enable)?;
                    }
                    if flip_flop.has_init_value() {
                        write!(f, " init={}", flip_flop.init_value)?;
                    }
                }
                Cell::Memory(memory) => {
                    writeln!(f, "memory depth=#{} width=#{} {{", memory.depth, memory.width)?;
                    if !memory.init_value.is_undef() {
                        for row in 0..memory.depth {
                            let row_value = memory.init_value.slice(row * memory.width..(row + 1) * memory.width);
                            writeln!(f, "  init {}", row_value)?;
                        }
                    }
                    for port in &memory.write_ports {
                        write!(f, "  write addr=")?;
                        self.write_value(f, &port.addr)?;
                        write!(f, " data=")?;
                        self.write_value(f, &port.data)?;
                        write!(f, " mask=")?;
                        self.write_value(f, &port.mask)?;
                        if let Some(clock) = port.clock {
                            write!(f, " clk=")?;
                            self.write_control_net(f, clock)?;
                        }
                        writeln!(f)?;
                    }
                    for port in &memory.read_ports {
                        write!(f, "  read addr=")?;
                        self.write_value(f, &port.addr)?;
                        if let Some(clock) = port.clock {
                            write!(f, " clk=")?;
                            self.write_control_net(f, clock)?;
                        }
                        if port.transparent {
                            write!(f, " transparent")?;
                        }
                        writeln!(f)?;
                    }
                    write!(f, "}}")?;
                }
                Cell::Other(instance) => {
                    writeln!(f, "instance {:?} {{", instance.kind)?;
                    for (name, value) in &instance.params {
                        writeln!(f, "  param {:?} {}", name, value)?;
                    }
                    for (name, value) in &instance.inputs {
                        write!(f, "  input {:?} ", name)?;
                        self.write_value(f, value)?;
                        writeln!(f)?;
                    }
                    for (name, range) in &instance.outputs {
                        writeln!(f, "  output {:?} +{}:{}", name, range.start, range.len())?;
                    }
                    write!(f, "}}")?;
                }
                Cell::Input(name, _width) => write!(f, "input {:?}", name)?,
                Cell::Output(name, value) => {
                    write!(f, "output {:?} ", name)?;
                    self.write_value(f, value)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
