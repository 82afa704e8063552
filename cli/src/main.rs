use std::collections::BTreeSet;
use std::error::Error;
use std::fs::File;
use std::io::{Read, Write};

use brammap_netlist::Design;
use brammap_pass::{map_memories, parse_rules};

fn read_input(name: &str) -> Result<Design, Box<dyn Error>> {
    let mut text = String::new();
    if name.is_empty() {
        std::io::stdin().read_to_string(&mut text)?;
    } else {
        File::open(name)
            .map_err(|error| format!("can't open input file `{}': {}", name, error))?
            .read_to_string(&mut text)?;
    }
    Ok(text.parse()?)
}

fn write_output(design: &Design, name: &str) -> Result<(), Box<dyn Error>> {
    if name.is_empty() {
        print!("{}", design);
    } else {
        write!(&mut File::create(name)?, "{}", design)?;
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut rules_path = String::new();
    let mut select: Vec<usize> = vec![];
    let mut input = String::new();
    let mut output = String::new();
    {
        let mut parser = argparse::ArgumentParser::new();
        parser.set_description("Map generic memory cells to block-RAM primitives.");
        parser
            .refer(&mut rules_path)
            .add_option(&["-r", "--rules"], argparse::Store, "Rules file describing the available BRAMs")
            .required();
        parser.refer(&mut select).add_option(
            &["-s", "--select"],
            argparse::Collect,
            "Only process the memory cell with this index (repeatable; default: all)",
        );
        parser.refer(&mut input).add_argument("INPUT", argparse::Store, "Input netlist (default: stdin)");
        parser.refer(&mut output).add_argument("OUTPUT", argparse::Store, "Output netlist (default: stdout)");
        parser.parse_args_or_exit();
    }

    let rules_text = std::fs::read_to_string(&rules_path)
        .map_err(|error| format!("can't open rules file `{}': {}", rules_path, error))?;
    let rules = parse_rules(&rules_text)?;

    let mut design = read_input(&input)?;
    let selection = if select.is_empty() { None } else { Some(BTreeSet::from_iter(select.iter().copied())) };
    map_memories(&mut design, &rules, selection.as_ref())?;
    write_output(&design, &output)?;
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("error: {}", error);
        std::process::exit(1)
    }
}
