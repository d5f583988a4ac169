// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/bin/simple_continueshot.rs - 摄像头连续检测
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

use std::{thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use safegear::{
  FromUrl,
  config::{ModelArgs, parse_image_location},
  context::AppContext,
  input::{DEFAULT_CAMERA_INDEX, V4lCamera},
  output::SaveImageFileOutput,
  task::{StopSignal, StreamingSession},
};
use tracing::{info, warn};

/// 从摄像头连续检测，最新一帧的结果写入输出文件
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub model: ModelArgs,
  /// 结果图像保存路径，每帧覆盖
  #[arg(long, value_name = "OUTPUT", value_parser = parse_image_location)]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<u64>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.model);
  info!("输出路径: {}", args.output);

  let model = args.model.loader()?.load()?;
  let ctx = AppContext::new(model, args.model.draw()?);
  let output = SaveImageFileOutput::from_url(&args.output)?;

  let stop = StopSignal::new();
  let handler_stop = stop.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    handler_stop.trigger();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理")?;

  let reason = StreamingSession::new()
    .with_frame_limit(args.frame_number)
    .run(
      || V4lCamera::open(DEFAULT_CAMERA_INDEX),
      &ctx,
      &output,
      &stop,
    )?;

  if reason.is_failure() {
    anyhow::bail!("视频流异常结束: {}", reason);
  }

  info!("任务完成，退出");
  Ok(())
}
