use sysdata::record::{LeafNameOpts, Scope};

use crate::{
    cli::LeafsArgs,
    files::{CliResult, load_declared},
    output::{OutputFormat, print_table},
};

pub fn run(args: &LeafsArgs, format: OutputFormat) -> CliResult<()> {
    let (rec, system) = load_declared(&args.record, &args.schema)?;
    let scope = match system {
        Some(system) => Scope::new(system, args.direction.into()),
        None => Scope::canonical(),
    };
    let col_names: Vec<&str> = args.columns.iter().map(String::as_str).collect();
    let names = rec.leaf_names(
        &scope,
        &LeafNameOpts {
            col_names: &col_names,
            name_type: args.names.into(),
            ..LeafNameOpts::default()
        },
    );

    match format {
        OutputFormat::Human => {
            let rows: Vec<Vec<String>> = names.iter().map(|name| vec![name.clone()]).collect();
            print_table(&["LEAF"], &rows);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&names)?);
        }
    }
    Ok(())
}
