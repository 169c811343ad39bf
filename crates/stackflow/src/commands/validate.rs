use colored::Colorize;
use stackflow_core::Workspace;

pub fn handle(workspace: &Workspace, name: &str, env: &str) -> anyhow::Result<()> {
    println!("{}", "マニフェストを検証中...".blue());
    println!(
        "マニフェスト: {}",
        workspace.manifest_path(name).display().to_string().cyan()
    );

    let workload = workspace.read_manifest(name)?;
    let mut manifest = workload.apply_env(env)?;
    manifest.validate()?;

    println!("{}", "✓ マニフェストは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  ワークロード: {} ({})", name.cyan(), manifest.kind());
    println!("  環境: {}", env.cyan());

    let declared = workload.environments();
    if !declared.is_empty() {
        println!("  定義済みの環境: {}", declared.join(", "));
    }

    let actions = manifest.requested_actions();
    if actions.is_empty() {
        println!("  環境コントローラー: (なし)");
    } else {
        println!("  環境コントローラー:");
        for action in actions {
            println!("    - {}", action.to_string().cyan());
        }
    }

    Ok(())
}
