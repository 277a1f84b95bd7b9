use sysdata::record::{Direction, DictOpts, KeyType, Scope};

use crate::{
    cli::PushArgs,
    files::{CliResult, load_with_system},
    output::{OutputFormat, pair_rows, pairs_json, print_table},
};

pub fn run(args: &PushArgs, format: OutputFormat) -> CliResult<()> {
    let (mut rec, system) = load_with_system(&args.record, &args.schema)?;
    let onto = Scope::new(system, Direction::Onto);
    let pairs = rec.to_dict(&DictOpts {
        scope: Some(&onto),
        key_type: KeyType::Name,
        put_empty_val: args.empty,
        ..DictOpts::default()
    });

    match format {
        OutputFormat::Human => print_table(&["FIELD", "VALUE"], &pair_rows(&pairs)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pairs_json(&pairs)?)?),
    }
    Ok(())
}
