use sysdata::record::{Atom, Direction, IdxPath, Record, Scope, SystemId, WriteOpts};
use tracing::{info, warn};

use crate::{
    cli::PullArgs,
    files::{CliResult, load_values, load_with_system, write_json},
    output::OutputFormat,
};

/// Stores backend values into the `From` aspects of `rec`.
///
/// Keys are backend names, or record paths for leaves the schema does not
/// name. Returns how many values were stored.
fn put_backend_values(
    rec: &mut Record,
    system: &SystemId,
    values: serde_json::Map<String, serde_json::Value>,
) -> CliResult<usize> {
    let from = Scope::new(system.clone(), Direction::From);
    let mut stored = 0;
    for (key, json) in values {
        let path = rec
            .system_field_path(&key)
            .cloned()
            .unwrap_or_else(|| IdxPath::parse(&key));
        if rec.field(&path).is_none() {
            warn!(%key, "backend value has no field");
            continue;
        }
        let val: Atom = serde_json::from_value(json)?;
        rec.set_val_in(path, val, &from, WriteOpts::exact());
        stored += 1;
    }
    Ok(stored)
}

pub fn run(args: &PullArgs, format: OutputFormat) -> CliResult<()> {
    let (mut rec, system) = load_with_system(&args.record, &args.schema)?;
    let values = load_values(&args.values)?;
    let stored = put_backend_values(&mut rec, &system, values)?;
    rec.pull(&system);
    info!(%system, stored, "pulled backend values");

    let json = rec.to_json();
    if let Some(output) = &args.output {
        write_json(output, &json)?;
        match format {
            OutputFormat::Human => println!("Wrote {}", output.display()),
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "output": output.display().to_string(),
                    "stored": stored,
                }))?
            ),
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&json)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cli::SchemaArgs, files::test_files};
    use tempfile::tempdir;

    #[test]
    fn test_pull_writes_converted_record() {
        let dir = tempdir().unwrap();
        let args = PullArgs {
            record: test_files::record(&dir),
            values: test_files::write(
                &dir,
                "values.json",
                serde_json::json!({"zA": "42", "zX": "x", "Nope": 1}),
            ),
            schema: SchemaArgs {
                schema: Some(test_files::schema(&dir)),
                system: None,
            },
            output: Some(dir.path().join("pulled.json")),
        };
        run(&args, OutputFormat::Human).unwrap();

        let pulled = crate::files::load_record(&dir.path().join("pulled.json")).unwrap();
        assert_eq!(pulled.val("A"), Some(Atom::Int(42)));
        assert_eq!(pulled.val("B/0/X"), Some(Atom::from("x")));
        assert_eq!(pulled.val("C"), Some(Atom::from("c")));
    }
}
