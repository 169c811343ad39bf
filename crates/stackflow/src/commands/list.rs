use colored::Colorize;
use stackflow_core::Workspace;

pub fn handle(workspace: &Workspace) -> anyhow::Result<()> {
    let names = workspace.workload_names()?;
    if names.is_empty() {
        println!("{}", "ワークロードがありません".yellow());
        return Ok(());
    }

    println!("ワークロード: {}個", names.len());
    for name in names {
        match workspace.read_manifest(&name) {
            Ok(workload) => println!("  - {} ({})", name.cyan(), workload.kind()),
            Err(e) => println!("  - {} {}", name.cyan(), format!("(読み込みエラー: {e})").red()),
        }
    }
    Ok(())
}
