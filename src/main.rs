// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/main.rs - 网页界面主程序
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

use std::{sync::Arc, time::Duration};

use actix_web::web;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use safegear::{
  config::ModelArgs,
  context::AppContext,
  input::open_default_camera,
  server::{self, CameraFactory, ServerState},
};

/// 等待摄像头释放的最长时间，超时后强制退出
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// SafeGear 安全装备检测界面
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub model: ModelArgs,

  /// 界面监听地址
  #[arg(long, default_value = "127.0.0.1:8501", value_name = "ADDR")]
  pub bind: String,

  /// 推送画面的 JPEG 质量 (1 - 100)
  #[arg(long, default_value = "80", value_name = "QUALITY")]
  pub jpeg_quality: u8,
}

#[actix_web::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.model);
  info!("置信度阈值: {}", args.model.confidence);
  info!("NMS 阈值: {}", args.model.iou_threshold);

  // 模型只在启动时加载一次，失败则直接退出
  info!("正在加载模型...");
  let model = args.model.loader()?.load().context("模型加载失败")?;
  let draw = args.model.draw()?;
  info!("模型加载完成");

  let camera: CameraFactory = Arc::new(open_default_camera);
  let state = web::Data::new(ServerState::new(
    AppContext::new(model, draw),
    camera,
    args.jpeg_quality,
  ));

  let served = server::serve(state.clone(), &args.bind).await;

  info!("界面已关闭，等待视频流退出...");
  if !state.shutdown(SHUTDOWN_TIMEOUT) {
    warn!("强制退出程序");
    std::process::exit(1);
  }
  served.with_context(|| format!("无法在 {} 上启动界面", args.bind))?;

  info!("退出");
  Ok(())
}
