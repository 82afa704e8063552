//! Maps generic memory cells onto grids of block-RAM primitives.
//!
//! The available primitives and the order in which to try them come from a
//! textual rules file (see [`parse_rules`]). For every memory cell, the
//! driver computes its match properties, walks the match rules in order,
//! and hands the first candidate that passes its `min`/`max` limits to the
//! port-assignment engine; when assignment succeeds, the tiling engine
//! replaces the cell with primitive instances plus glue logic, and when it
//! fails, the descriptor is set aside for this memory and the next rule is
//! tried. A memory no rule can map is left in place.

use std::collections::BTreeSet;
use std::fmt::Display;

use brammap_netlist::{Cell, CellIndex, Design, Memory, Value};

mod assign;
mod props;
mod rules;
mod tile;

pub use assign::{assign_ports, port_infos, Assignment, PortInfo};
pub use props::{add_candidate_properties, memory_properties};
pub use rules::{parse_rules, Bram, MatchRule, Rules};
pub use tile::tile_memory;

/// A fatal configuration problem: the rules file is unusable or a match
/// rule refers to something that does not exist. Failures to map an
/// individual memory are not errors; they are logged and the memory is
/// left untouched.
#[derive(Debug)]
pub enum Error {
    RulesSyntax { line: usize },
    RulesUnexpectedEof { line: usize },
    UnknownBram { name: String },
    UnknownProperty { property: String, bram: String },
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::RulesSyntax { line } => write!(f, "syntax error in rules file line {}", line),
            Error::RulesUnexpectedEof { line } => {
                write!(f, "unexpected end of rules file in line {}", line)
            }
            Error::UnknownBram { name } => write!(f, "no bram description named {} in rules file", name),
            Error::UnknownProperty { property, bram } => {
                write!(f, "unknown property {:?} in match rule for bram {}", property, bram)
            }
        }
    }
}

impl std::error::Error for Error {}

fn handle_memory(
    design: &mut Design,
    rules: &Rules,
    index: CellIndex,
    memory: &Memory,
    output: &Value,
) -> Result<(), Error> {
    log::debug!("processing memory cell {}", index);

    let mut props = memory_properties(memory);
    log::debug!(
        "  properties: {}",
        Vec::from_iter(props.iter().map(|(name, value)| format!("{}={}", name, value))).join(" ")
    );

    // a descriptor that failed assignment is structurally incompatible
    // with this memory; don't retry it for a later rule
    let mut failed_brams: BTreeSet<&str> = BTreeSet::new();

    'rules: for (rule_index, rule) in rules.matches.iter().enumerate() {
        let bram = rules.brams.get(&rule.name).ok_or_else(|| Error::UnknownBram { name: rule.name.clone() })?;
        if failed_brams.contains(rule.name.as_str()) {
            continue;
        }

        add_candidate_properties(&mut props, bram);
        log::debug!(
            "  wasted bits for bram type {}: awaste={} dwaste={} waste={}",
            bram.name,
            props["awaste"],
            props["dwaste"],
            props["waste"]
        );

        for (kind, limits) in [("min", &rule.min_limits), ("max", &rule.max_limits)] {
            for (property, &limit) in limits {
                let value = *props.get(property).ok_or_else(|| Error::UnknownProperty {
                    property: property.clone(),
                    bram: rule.name.clone(),
                })?;
                let met = if kind == "min" { value >= limit } else { value <= limit };
                if !met {
                    log::debug!(
                        "  rule #{} for bram type {} rejected: requirement '{} {} {}' not met",
                        rule_index,
                        rule.name,
                        kind,
                        property,
                        limit
                    );
                    continue 'rules;
                }
            }
        }

        log::debug!("  rule #{} for bram type {} accepted", rule_index, rule.name);
        log::debug!("  mapping to bram type {}:", bram.name);
        match assign_ports(memory, output, bram) {
            Some(assignment) => {
                tile_memory(design, index, memory, output, bram, &assignment);
                return Ok(());
            }
            None => {
                log::debug!("  mapping to bram type {} failed", bram.name);
                failed_brams.insert(rule.name.as_str());
            }
        }
    }

    log::debug!("  no acceptable bram resources found for memory cell {}", index);
    Ok(())
}

/// Runs the pass over every memory cell of the design, or over the cells
/// listed in `selection` (by cell index, as printed) when one is given.
///
/// A memory that no rule maps is left unchanged; only configuration
/// problems abort with an `Err`.
pub fn map_memories(design: &mut Design, rules: &Rules, selection: Option<&BTreeSet<usize>>) -> Result<(), Error> {
    let memories: Vec<(CellIndex, Memory, Value)> = design
        .iter_cells()
        .filter(|(index, _)| selection.map_or(true, |selection| selection.contains(&index.debug_index())))
        .filter_map(|(index, cell)| match cell {
            Cell::Memory(memory) => Some((index, memory.clone(), design.cell_output(index))),
            _ => None,
        })
        .collect();
    for (index, memory, output) in memories {
        handle_memory(design, rules, index, &memory, &output)?;
    }
    Ok(())
}
