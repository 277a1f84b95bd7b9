use crate::{
    cli::CompareArgs,
    files::{CliResult, load_record},
    output::OutputFormat,
};

pub fn run(args: &CompareArgs, format: OutputFormat) -> CliResult<()> {
    let left = load_record(&args.left)?;
    let right = load_record(&args.right)?;
    let fields: Vec<&str> = args.fields.iter().map(String::as_str).collect();
    let exclude: Vec<&str> = args.exclude.iter().map(String::as_str).collect();
    let dif = left.compare_leafs(&right, &fields, &exclude);

    match format {
        OutputFormat::Human => {
            if dif.is_empty() {
                println!("Records match");
            }
            for line in &dif {
                println!("{line}");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "equal": dif.is_empty(),
                "differences": dif,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}
