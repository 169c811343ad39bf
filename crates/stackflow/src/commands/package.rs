use crate::PackageArgs;
use crate::session::LocalSession;
use anyhow::Context;
use colored::Colorize;
use stackflow_config::Settings;
use stackflow_core::{AddonFragment, RuntimeContext, WorkloadStack, Workspace, addon};
use std::path::{Path, PathBuf};

/// 生成したファイル
#[derive(Debug)]
pub struct PackageOutput {
    pub template: PathBuf,
    pub params: PathBuf,
    pub addons: Option<PathBuf>,
}

pub fn handle(
    workspace: &Workspace,
    settings: &Settings,
    args: &PackageArgs,
) -> anyhow::Result<PackageOutput> {
    println!(
        "{} {} ({})",
        "パッケージ中:".blue(),
        args.name.cyan(),
        args.env.cyan()
    );

    let workload = workspace.read_manifest(&args.name)?;
    let mut manifest = workload.apply_env(&args.env)?;
    manifest.validate()?;

    let session = LocalSession::new(
        args.registry.clone().or_else(|| settings.registry.clone()),
        &args.app,
        args.tag.clone().or_else(|| settings.image_tag.clone()),
    );
    manifest.load(&session)?;

    let addon = find_addon(workspace, &args.name)?;
    if addon.is_some() && args.addons_url.is_none() {
        anyhow::bail!(
            "'{}' にはアドオンがあります。アップロード先の URL を --addons-url で指定してください",
            args.name
        );
    }

    let mut context = RuntimeContext::new(
        &args.app,
        &args.env,
        &args.sd_endpoint,
        &args.env_version,
    );
    if let Some(url) = &args.addons_url {
        context = context.with_addons_template_url(url);
    }
    if let Some(location) = &settings.env_controller_location {
        context = context.with_env_controller_location(location);
    }

    let actions = manifest.requested_actions();
    let mut stack = WorkloadStack::new(manifest, context)?;
    if let Some(addon) = addon {
        stack = stack.with_addon(addon);
    }

    let template = stack.template()?;
    let params = stack.serialized_parameters()?;
    let addon_template = stack.addon_template()?;

    let output_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&output_dir).with_context(|| {
        format!(
            "出力ディレクトリを作成できません: {}",
            output_dir.display()
        )
    })?;

    let base = format!("{}-{}", args.name, args.env);
    let output = PackageOutput {
        template: write(&output_dir, &format!("{base}.stack.yml"), &template)?,
        params: write(&output_dir, &format!("{base}.params.json"), &params)?,
        addons: addon_template
            .map(|content| write(&output_dir, &format!("{base}.addons.stack.yml"), &content))
            .transpose()?,
    };

    println!("{}", "✓ パッケージが完了しました".green().bold());
    println!("  テンプレート: {}", output.template.display().to_string().cyan());
    println!("  パラメータ:   {}", output.params.display().to_string().cyan());
    if let Some(addons) = &output.addons {
        println!("  アドオン:     {}", addons.display().to_string().cyan());
    }
    if !actions.is_empty() {
        let names: Vec<String> = actions.iter().map(ToString::to_string).collect();
        println!("  環境コントローラー: {}", names.join(", ").yellow());
    }

    Ok(output)
}

fn find_addon(workspace: &Workspace, name: &str) -> anyhow::Result<Option<AddonFragment>> {
    match addon::parse(name, workspace) {
        Ok(fragment) => Ok(Some(fragment)),
        Err(e) if e.is_not_found() => {
            tracing::debug!(workload = %name, "アドオンはありません");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn write(dir: &Path, file_name: &str, content: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(file_name);
    std::fs::write(&path, content)
        .with_context(|| format!("ファイルを書き込めません: {}", path.display()))?;
    Ok(path)
}
