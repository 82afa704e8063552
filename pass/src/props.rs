use std::collections::BTreeMap;

use brammap_netlist::Memory;

use crate::Bram;

/// Properties of a memory that match rules can bound: dimensions and port
/// counts. `dbits` is the memory's data width, matching the vocabulary of
/// the rules file rather than the netlist.
pub fn memory_properties(memory: &Memory) -> BTreeMap<String, i64> {
    let mut props = BTreeMap::new();
    let words = memory.depth as i64;
    let dbits = memory.width as i64;
    props.insert("words".to_owned(), words);
    props.insert("abits".to_owned(), memory.addr_bits() as i64);
    props.insert("dbits".to_owned(), dbits);
    props.insert("wports".to_owned(), memory.write_ports.len() as i64);
    props.insert("rports".to_owned(), memory.read_ports.len() as i64);
    props.insert("bits".to_owned(), words * dbits);
    props.insert("ports".to_owned(), (memory.write_ports.len() + memory.read_ports.len()) as i64);
    props
}

/// Adds the per-candidate waste properties: address slots and data bits of
/// the primitive that tiling this memory onto it would leave unused.
pub fn add_candidate_properties(props: &mut BTreeMap<String, i64>, bram: &Bram) {
    let words = props["words"];
    let dbits = props["dbits"];

    let aover = words % (1i64 << bram.abits);
    let awaste = if aover == 0 { 0 } else { (1i64 << bram.abits) - aover };
    props.insert("awaste".to_owned(), awaste);

    let dover = dbits % bram.dbits as i64;
    let dwaste = if dover == 0 { 0 } else { bram.dbits as i64 - dover };
    props.insert("dwaste".to_owned(), dwaste);

    let waste = awaste * bram.dbits as i64 + dwaste * (1i64 << bram.abits) - awaste * dwaste;
    props.insert("waste".to_owned(), waste);
}
