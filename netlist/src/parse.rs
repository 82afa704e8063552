use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::Range;
use std::str::FromStr;

use yap::{one_of, types::WithContext, IntoTokens, TokenLocation, Tokens};

use crate::{
    Cell, Const, ControlNet, Design, FlipFlop, Instance, Memory, MemoryReadPort, MemoryWritePort, Net, ParamValue,
    Value,
};

#[derive(Debug)]
struct Context {
    design: Design,
    def_map: BTreeMap<usize, Value>,        // definition: index -> output
    use_map: BTreeMap<(usize, usize), Net>, // forward reference: index + offset -> placeholder
}

impl Context {
    fn new() -> Context {
        Context { design: Design::new(), def_map: BTreeMap::new(), use_map: BTreeMap::new() }
    }

    fn add_def(&mut self, index: usize, width: usize, output: Value) {
        assert_eq!(output.len(), width, "cell output width should match declaration width");
        assert!(self.def_map.insert(index, output).is_none(), "cell index %{} is defined twice", index);
    }

    fn get_use(&mut self, index: usize, offsets: Range<usize>) -> Value {
        if let Some(output) = self.def_map.get(&index) {
            output.slice(offsets)
        } else {
            let mut nets = vec![];
            for offset in offsets {
                let net = *self
                    .use_map
                    .entry((index, offset))
                    .or_insert_with(|| self.design.add_void(1).unwrap_net());
                nets.push(net);
            }
            Value::from(nets)
        }
    }

    fn apply(mut self) -> Design {
        for ((index, offset), placeholder) in std::mem::take(&mut self.use_map) {
            match self.def_map.get(&index) {
                Some(output) if offset < output.len() => self.design.replace_net(placeholder, output[offset]),
                Some(output) => {
                    panic!("reference %{}+{} out of bounds for definition %{}:{}", index, offset, index, output.len())
                }
                None => panic!("unresolved reference %{}", index),
            }
        }
        self.design
    }
}

fn parse_space(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> bool {
    t.skip_while(|c| *c == ' ' || *c == '\t') > 0
}

fn parse_comment(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> bool {
    if !t.token(';') {
        return false;
    }
    t.skip_while(|c| *c != '\n');
    true
}

fn parse_blank(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> bool {
    let space = parse_space(t);
    let comment = parse_comment(t);
    space || comment
}

fn parse_symbol(t: &mut WithContext<impl Tokens<Item = char>, Context>, symbol: char) -> Option<()> {
    if !t.token(symbol) {
        return None;
    }
    Some(())
}

fn parse_decimal<V: FromStr>(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<V> {
    t.take_while(|c| c.is_ascii_digit() || *c == '-').parse::<V, String>().ok()
}

fn parse_string(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<String> {
    parse_symbol(t, '"')?;
    let mut chars = String::new();
    loop {
        match t.next() {
            Some('"') => break,
            Some('\\') => chars.push(t.next()?),
            Some(char) => chars.push(char),
            None => return None,
        }
    }
    Some(chars)
}

fn parse_const(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<Const> {
    t.take_while(|c| matches!(*c, '0' | '1' | 'X')).parse::<Const, String>().ok().filter(|value| !value.is_empty())
}

fn parse_keyword(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<String> {
    let name: String = t.take_while(|c| c.is_ascii_alphanumeric() || *c == '_').collect();
    if name.is_empty() {
        return None;
    }
    Some(name)
}

#[must_use]
fn parse_keyword_expect(t: &mut WithContext<impl Tokens<Item = char>, Context>, expected: &str) -> Option<()> {
    if parse_keyword(t)? != expected {
        return None;
    }
    Some(())
}

#[must_use]
fn parse_keyword_eq_expect(t: &mut WithContext<impl Tokens<Item = char>, Context>, expected: &str) -> Option<()> {
    parse_keyword_expect(t, expected)?;
    parse_symbol(t, '=')?;
    Some(())
}

fn parse_cell_ref(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<(usize, usize, usize)> {
    parse_symbol(t, '%')?;
    let index = parse_decimal(t)?;
    let offset = if parse_symbol(t, '+').is_some() { parse_decimal(t)? } else { 0 };
    let width = if parse_symbol(t, ':').is_some() { parse_decimal(t)? } else { 1 };
    Some((index, offset, width))
}

fn parse_value_part(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<Value> {
    let value = one_of!(t;
        parse_const(t).map(Value::from),
        parse_cell_ref(t).map(|(index, offset, width)| t.context_mut().get_use(index, offset..offset + width)),
    )?;
    if parse_symbol(t, '*').is_some() {
        let count = parse_decimal(t)?;
        Some(value.repeat(count))
    } else {
        Some(value)
    }
}

fn parse_value_concat(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<Value> {
    parse_symbol(t, '[')?;
    let mut parts = vec![];
    loop {
        parse_blank(t);
        if parse_symbol(t, ']').is_some() {
            break;
        }
        parts.push(parse_value_part(t)?);
    }
    let mut value = Value::new();
    for part in parts.into_iter().rev() {
        value.extend(part.iter());
    }
    Some(value)
}

fn parse_value_arg(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<Value> {
    parse_blank(t);
    one_of!(t;
        parse_value_part(t),
        parse_value_concat(t)
    )
}

fn parse_net_arg(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<Net> {
    parse_blank(t);
    let value = parse_value_part(t)?;
    assert_eq!(value.len(), 1, "reference should be a single net");
    Some(value[0])
}

fn parse_control_net(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<ControlNet> {
    let negated = parse_symbol(t, '!').is_some();
    let net = parse_net_arg(t)?;
    if negated {
        Some(ControlNet::Neg(net))
    } else {
        Some(ControlNet::Pos(net))
    }
}

fn parse_control_arg(t: &mut WithContext<impl Tokens<Item = char>, Context>, name: &str) -> Option<ControlNet> {
    parse_blank(t);
    parse_keyword_eq_expect(t, name)?;
    parse_control_net(t)
}

fn parse_int_arg<V: FromStr>(t: &mut WithContext<impl Tokens<Item = char>, Context>, name: &str) -> Option<V> {
    parse_blank(t);
    parse_keyword_eq_expect(t, name)?;
    parse_symbol(t, '#')?;
    parse_decimal(t)
}

fn parse_string_arg(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<String> {
    parse_blank(t);
    parse_string(t)
}

fn parse_memory(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<Memory> {
    let depth: usize = parse_int_arg(t, "depth")?;
    let width: usize = parse_int_arg(t, "width")?;
    parse_blank(t);
    parse_symbol(t, '{')?;
    parse_blank(t);
    parse_symbol(t, '\n')?;
    let mut init_value = Const::new();
    let mut write_ports = vec![];
    let mut read_ports = vec![];
    loop {
        parse_blank(t);
        if parse_symbol(t, '}').is_some() {
            break;
        }
        match parse_keyword(t)?.as_str() {
            "init" => {
                parse_blank(t);
                let row = parse_const(t)?;
                assert_eq!(row.len(), width, "memory init row width should match memory width");
                init_value = init_value.concat(&row);
            }
            "write" => {
                parse_blank(t);
                parse_keyword_eq_expect(t, "addr")?;
                let addr = parse_value_arg(t)?;
                parse_blank(t);
                parse_keyword_eq_expect(t, "data")?;
                let data = parse_value_arg(t)?;
                parse_blank(t);
                parse_keyword_eq_expect(t, "mask")?;
                let mask = parse_value_arg(t)?;
                let clock = t.optional(|t| parse_control_arg(t, "clk"));
                write_ports.push(MemoryWritePort { addr, data, mask, clock });
            }
            "read" => {
                parse_blank(t);
                parse_keyword_eq_expect(t, "addr")?;
                let addr = parse_value_arg(t)?;
                let clock = t.optional(|t| parse_control_arg(t, "clk"));
                let transparent = t
                    .optional(|t| {
                        parse_blank(t);
                        parse_keyword_expect(t, "transparent")
                    })
                    .is_some();
                read_ports.push(MemoryReadPort { addr, clock, transparent });
            }
            _ => return None,
        }
        parse_blank(t);
        parse_symbol(t, '\n')?;
    }
    if init_value.is_empty() {
        init_value = Const::undef(depth * width);
    } else {
        assert_eq!(init_value.len(), depth * width, "memory init should cover every word");
    }
    Some(Memory { depth, width, init_value, write_ports, read_ports })
}

fn parse_param_value(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<ParamValue> {
    parse_blank(t);
    one_of!(t;
        parse_symbol(t, '#').and_then(|()| parse_decimal::<i64>(t)).map(ParamValue::Int),
        parse_string(t).map(ParamValue::String),
        parse_const(t).map(ParamValue::Const),
    )
}

fn parse_instance(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<Instance> {
    let mut instance = Instance::new(parse_string_arg(t)?);
    parse_blank(t);
    parse_symbol(t, '{')?;
    parse_blank(t);
    parse_symbol(t, '\n')?;
    loop {
        parse_blank(t);
        if parse_symbol(t, '}').is_some() {
            break;
        }
        match parse_keyword(t)?.as_str() {
            "param" => {
                let name = parse_string_arg(t)?;
                let value = parse_param_value(t)?;
                instance.params.insert(name, value);
            }
            "input" => {
                let name = parse_string_arg(t)?;
                let value = parse_value_arg(t)?;
                instance.inputs.insert(name, value);
            }
            "output" => {
                let name = parse_string_arg(t)?;
                parse_blank(t);
                parse_symbol(t, '+')?;
                let start: usize = parse_decimal(t)?;
                parse_symbol(t, ':')?;
                let len: usize = parse_decimal(t)?;
                instance.outputs.insert(name, start..start + len);
            }
            _ => return None,
        }
        parse_blank(t);
        parse_symbol(t, '\n')?;
    }
    Some(instance)
}

fn parse_cell(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> Option<()> {
    parse_symbol(t, '%')?;
    let index = parse_decimal(t)?;
    parse_symbol(t, ':')?;
    let width: usize = parse_decimal(t)?;
    parse_blank(t);
    parse_symbol(t, '=')?;
    parse_blank(t);
    let cell = match parse_keyword(t)?.as_str() {
        "eq" => Cell::Eq(parse_value_arg(t)?, parse_value_arg(t)?),
        "mux" => Cell::Mux(parse_net_arg(t)?, parse_value_arg(t)?, parse_value_arg(t)?),
        "dff" => {
            let data = parse_value_arg(t)?;
            let clock = parse_control_arg(t, "clk")?;
            let enable = t.optional(|t| parse_control_arg(t, "en")).unwrap_or(ControlNet::ONE);
            let init_value = t
                .optional(|t| {
                    parse_blank(t);
                    parse_keyword_eq_expect(t, "init")?;
                    parse_const(t)
                })
                .unwrap_or_else(|| Const::undef(data.len()));
            Cell::Dff(FlipFlop { data, clock, enable, init_value })
        }
        "memory" => Cell::Memory(parse_memory(t)?),
        "instance" => Cell::Other(parse_instance(t)?),
        "input" => Cell::Input(parse_string_arg(t)?, width),
        "output" => Cell::Output(parse_string_arg(t)?, parse_value_arg(t)?),
        _ => return None,
    };
    let ctx = t.context_mut();
    let output = ctx.design.add_cell(cell);
    ctx.add_def(index, width, output);
    parse_blank(t);
    parse_symbol(t, '\n')?;
    Some(())
}

fn parse_line(t: &mut WithContext<impl Tokens<Item = char>, Context>) -> bool {
    parse_blank(t);
    one_of!(t;
        parse_cell(t).is_some(),
        t.token('\n')
    )
}

#[derive(Debug)]
pub struct ParseError {
    source: String,
    offset: usize,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to parse near offset {}: {:?}", self.offset, &self.source[self.offset..])
    }
}

impl std::error::Error for ParseError {}

pub fn parse(source: &str) -> Result<Design, ParseError> {
    let context = Context::new();
    let mut tokens = source.into_tokens().with_context(context);
    while parse_line(&mut tokens) {}
    parse_blank(&mut tokens);
    let (mut tokens, context) = tokens.into_parts();
    if !tokens.eof() {
        return Err(ParseError { source: String::from(source), offset: tokens.location().offset() });
    }
    Ok(context.apply())
}

impl FromStr for Design {
    type Err = ParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        parse(source)
    }
}
