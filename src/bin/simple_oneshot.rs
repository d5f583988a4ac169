// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像检测
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use anyhow::Result;
use clap::Parser;
use url::Url;

use safegear::{
  FromUrl,
  config::{ModelArgs, parse_image_location},
  context::AppContext,
  input::ImageFileInput,
  model::{PpeLabel, WithLabel},
  output::{Render, SaveImageFileOutput},
  task::SingleShotSession,
};
use tracing::info;

/// 对一张图像做 PPE 检测并保存结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub model: ModelArgs,
  /// 输入图像（JPEG/PNG）
  #[arg(long, value_name = "SOURCE", value_parser = parse_image_location)]
  pub input: Url,
  /// 结果图像保存路径
  #[arg(long, value_name = "OUTPUT", value_parser = parse_image_location)]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let model = args.model.loader()?.load()?;
  let ctx = AppContext::new(model, args.model.draw()?);
  let output = SaveImageFileOutput::from_url(&args.output)?;

  let mut session = SingleShotSession::<PpeLabel>::new();
  session.accept(ImageFileInput::from_url(&args.input))?;

  let Some(frame) = session.image().cloned() else {
    anyhow::bail!("没有可检测的图像");
  };
  let annotated = session.detect(&ctx)?;
  for item in annotated.result.items.iter() {
    info!(
      "  - {}: {:.2}% at {:?}",
      item.kind.to_label_str(),
      item.score * 100.0,
      item.bbox
    );
  }
  output.render_result(&frame, annotated)?;
  info!("结果已保存: {}", output.path().display());

  if let Some(notice) = session.notice() {
    info!("{}", notice);
  }
  Ok(())
}
