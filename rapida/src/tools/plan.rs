use anyhow::Result;
use clap::Args;
use std::{collections::BTreeSet, path::PathBuf};

#[derive(Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// YAML run file
	#[arg(required = true)]
	config: PathBuf,

	/// directory for downloads and results, replaces project.output_dir
	#[arg(long, short)]
	output: Option<PathBuf>,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let config = super::load_config(&arguments.config, arguments.output.as_ref())?;
	let tasks = super::plan_tasks(&config).await?;

	for task in &tasks {
		let state = if task.output_path().exists() { "cached" } else { "pending" };
		println!("{}\t{state}\t{}", task.name(), task.url);
	}
	let tiles: BTreeSet<&str> = tasks.iter().map(|task| task.tile_id.as_str()).collect();
	eprintln!("{} assets in {} tiles", tasks.len(), tiles.len());
	Ok(())
}
