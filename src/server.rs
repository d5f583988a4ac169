// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/server.rs - 网页界面服务
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

use std::{
  sync::{Arc, Mutex, MutexGuard},
  thread::JoinHandle,
  time::{Duration, Instant},
};

use actix_web::{
  App, HttpResponse, HttpServer,
  http::{StatusCode, header},
  web::{self, Bytes},
};
use async_stream::stream;
use chrono::Local;
use image::RgbImage;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{
  context::{AppContext, PpeModel},
  input::{CaptureError, InputSource},
  model::PpeLabel,
  output::{DetectionSummary, LiveFrameOutput, SharedFrame, encode_jpeg},
  task::{SessionError, SingleShotSession, SingleShotState, StopSignal, StreamingSession},
};

mod page;

/// 上传图像的大小上限
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// 打开摄像头的方式，每次开始视频流时调用一次
pub type CameraFactory =
  Arc<dyn Fn() -> Result<Box<dyn InputSource + Send>, CaptureError> + Send + Sync>;

/// 所有请求共享的状态
///
/// 单张检测会话只有一份，面向本机的单个用户；视频流在独立线程中运行。
pub struct ServerState<M> {
  ctx: AppContext<M>,
  single: Mutex<SingleShotSession<PpeLabel>>,
  streaming: StreamingSession,
  stop: StopSignal,
  live: LiveFrameOutput,
  camera: CameraFactory,
  worker: Mutex<Option<JoinHandle<()>>>,
  jpeg_quality: u8,
}

impl<M: PpeModel> ServerState<M> {
  pub fn new(ctx: AppContext<M>, camera: CameraFactory, jpeg_quality: u8) -> Self {
    let jpeg_quality = jpeg_quality.clamp(1, 100);
    Self {
      ctx,
      single: Mutex::new(SingleShotSession::new()),
      streaming: StreamingSession::new(),
      stop: StopSignal::new(),
      live: LiveFrameOutput::new(SharedFrame::default()).with_jpeg_quality(jpeg_quality),
      camera,
      worker: Mutex::new(None),
      jpeg_quality,
    }
  }

  fn lock_single(&self) -> MutexGuard<'_, SingleShotSession<PpeLabel>> {
    self.single.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    self.worker.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// 等待视频流线程退出
  pub fn join_worker(&self) {
    let handle = self.lock_worker().take();
    if let Some(handle) = handle
      && handle.join().is_err()
    {
      error!("视频流线程异常退出");
    }
  }

  /// 视频流线程是否还在运行
  fn stream_active(&self) -> bool {
    self
      .lock_worker()
      .as_ref()
      .is_some_and(|handle| !handle.is_finished())
  }

  /// 发送停止信号并等待摄像头释放，超时返回 false
  pub fn shutdown(&self, timeout: Duration) -> bool {
    self.stop.trigger();
    let deadline = Instant::now() + timeout;
    while self.stream_active() {
      if Instant::now() >= deadline {
        warn!("等待视频流退出超时 ({:?})", timeout);
        return false;
      }
      std::thread::sleep(Duration::from_millis(20));
    }
    self.join_worker();
    true
  }
}

#[derive(Debug, Serialize)]
struct SingleShotView {
  state: SingleShotState,
  has_image: bool,
  notice: Option<String>,
  detections: Vec<DetectionSummary>,
}

impl SingleShotView {
  fn of(session: &SingleShotSession<PpeLabel>) -> Self {
    Self {
      state: session.state(),
      has_image: session.image().is_some(),
      notice: session.notice().map(str::to_string),
      detections: session
        .result()
        .map(|annotated| DetectionSummary::from_result(&annotated.result))
        .unwrap_or_default(),
    }
  }
}

/// 注册所有路由
pub fn routes<M: PpeModel>(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
    .route("/", web::get().to(index_route))
    .route("/image", web::post().to(upload_handler::<M>))
    .route("/image/input.jpg", web::get().to(input_image_handler::<M>))
    .route("/image/result.jpg", web::get().to(result_image_handler::<M>))
    .route("/detect", web::post().to(detect_handler::<M>))
    .route("/webcam/start", web::post().to(webcam_start_handler::<M>))
    .route("/webcam/stop", web::post().to(webcam_stop_handler::<M>))
    .route("/webcam/stream.mjpg", web::get().to(stream_handler::<M>))
    .route("/status", web::get().to(status_handler::<M>));
}

/// 启动网页服务，直到收到退出信号
pub async fn serve<M: PpeModel>(state: web::Data<ServerState<M>>, bind: &str) -> std::io::Result<()> {
  info!("界面地址: http://{}", bind);
  HttpServer::new(move || App::new().app_data(state.clone()).configure(routes::<M>))
    .bind(bind)?
    .run()
    .await
}

async fn index_route() -> HttpResponse {
  HttpResponse::Ok()
    .content_type("text/html; charset=utf-8")
    .body(page::INDEX_HTML)
}

fn blocking_failed(err: impl std::fmt::Display) -> HttpResponse {
  error!("后台任务失败: {}", err);
  HttpResponse::InternalServerError().json(json!({ "notice": err.to_string() }))
}

fn jpeg_response(jpeg: Result<Vec<u8>, crate::output::RenderError>) -> HttpResponse {
  match jpeg {
    Ok(jpeg) => HttpResponse::Ok()
      .content_type("image/jpeg")
      .append_header((header::CACHE_CONTROL, "no-cache"))
      .body(jpeg),
    Err(e) => blocking_failed(e),
  }
}

/// 上传图像，请求体为 JPEG/PNG 原始字节
async fn upload_handler<M: PpeModel>(state: web::Data<ServerState<M>>, body: Bytes) -> HttpResponse {
  let uploaded = web::block(move || {
    let mut single = state.lock_single();
    let accepted = single.upload(&body).is_ok();
    (accepted, SingleShotView::of(&single))
  })
  .await;

  match uploaded {
    Ok((true, view)) => HttpResponse::Ok().json(view),
    Ok((false, view)) => HttpResponse::BadRequest().json(view),
    Err(e) => blocking_failed(e),
  }
}

fn uploaded_image(session: &SingleShotSession<PpeLabel>) -> Option<&RgbImage> {
  session.image().map(|frame| &frame.image)
}

fn result_image(session: &SingleShotSession<PpeLabel>) -> Option<&RgbImage> {
  session.result().map(|annotated| &annotated.image)
}

/// 在线程池中编码会话里的图像
async fn single_image_response<M: PpeModel>(
  state: web::Data<ServerState<M>>,
  pick: fn(&SingleShotSession<PpeLabel>) -> Option<&RgbImage>,
) -> HttpResponse {
  let encoded = web::block(move || {
    let single = state.lock_single();
    pick(&single).map(|image| encode_jpeg(image, state.jpeg_quality))
  })
  .await;

  match encoded {
    Ok(Some(jpeg)) => jpeg_response(jpeg),
    Ok(None) => HttpResponse::NoContent().finish(),
    Err(e) => blocking_failed(e),
  }
}

async fn input_image_handler<M: PpeModel>(state: web::Data<ServerState<M>>) -> HttpResponse {
  single_image_response(state, uploaded_image).await
}

async fn result_image_handler<M: PpeModel>(state: web::Data<ServerState<M>>) -> HttpResponse {
  single_image_response(state, result_image).await
}

/// 对已上传的图像运行检测，推理期间不持有会话锁
async fn detect_handler<M: PpeModel>(state: web::Data<ServerState<M>>) -> HttpResponse {
  let detected = web::block(move || {
    let begun = state.lock_single().begin_detect();
    let status = match begun {
      Ok(frame) => {
        let outcome = state.ctx.detect(&frame);
        match state.lock_single().finish_detect(outcome) {
          Ok(_) => StatusCode::OK,
          Err(SessionError::Superseded) => StatusCode::CONFLICT,
          Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
      }
      Err(_) => StatusCode::CONFLICT,
    };
    (status, SingleShotView::of(&state.lock_single()))
  })
  .await;

  match detected {
    Ok((status, view)) => HttpResponse::build(status).json(view),
    Err(e) => blocking_failed(e),
  }
}

/// 在独立线程中开始视频流，同一时间只允许一个
fn spawn_stream<M: PpeModel>(state: &web::Data<ServerState<M>>) -> Result<(), SessionError> {
  let mut worker = state.lock_worker();
  if let Some(handle) = worker.take() {
    if !handle.is_finished() {
      *worker = Some(handle);
      return Err(SessionError::AlreadyRunning);
    }
    if handle.join().is_err() {
      error!("上一个视频流线程异常退出");
    }
  }

  state.stop.reset();
  state.live.clear();

  let task_state = state.clone();
  let handle = std::thread::Builder::new()
    .name("safegear-webcam".into())
    .spawn(move || {
      let task = &task_state;
      match task
        .streaming
        .run(|| (task.camera)(), &task.ctx, &task.live, &task.stop)
      {
        Ok(reason) => debug!("视频流线程退出: {}", reason),
        Err(e) => warn!("视频流未能开始: {}", e),
      }
    })
    .map_err(|e| {
      error!("无法创建视频流线程: {}", e);
      SessionError::Spawn(e)
    })?;

  *worker = Some(handle);
  Ok(())
}

async fn webcam_start_handler<M: PpeModel>(state: web::Data<ServerState<M>>) -> HttpResponse {
  match spawn_stream(&state) {
    Ok(()) => {
      info!("收到开始视频流请求");
      HttpResponse::Accepted().json(json!({ "notice": "started" }))
    }
    Err(e @ SessionError::AlreadyRunning) => HttpResponse::Conflict().json(json!({ "notice": e.to_string() })),
    Err(e) => blocking_failed(e),
  }
}

async fn webcam_stop_handler<M: PpeModel>(state: web::Data<ServerState<M>>) -> HttpResponse {
  info!("收到停止视频流请求");
  state.stop.trigger();
  HttpResponse::Accepted().json(json!({ "notice": "stopping" }))
}

/// 以 MJPEG 推送最新的检测画面，视频流线程退出后结束
async fn stream_handler<M: PpeModel>(state: web::Data<ServerState<M>>) -> HttpResponse {
  let stream = stream! {
    let mut interval = actix_web::rt::time::interval(Duration::from_millis(33));
    let mut last_sent = None;
    loop {
      interval.tick().await;
      // 先取状态再取画面，线程退出前的最后一帧也会发出
      let active = state.stream_active();
      let frame = state.live.slot().lock().ok().and_then(|guard| guard.clone());
      if let Some(packet) = frame {
        if last_sent != Some(packet.frame_number) {
          last_sent = Some(packet.frame_number);

          let mut payload = Vec::with_capacity(packet.jpeg.len() + 64);
          payload.extend_from_slice(b"--frame\r\n");
          payload.extend_from_slice(format!("X-Sequence: {}\r\n", packet.frame_number).as_bytes());
          payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
          payload.extend_from_slice(&packet.jpeg);
          payload.extend_from_slice(b"\r\n");
          yield Ok::<Bytes, actix_web::Error>(Bytes::from(payload));
        }
      }
      if !active {
        debug!("视频流已结束，关闭 MJPEG 连接");
        break;
      }
    }
  };

  HttpResponse::Ok()
    .append_header((header::CACHE_CONTROL, "no-cache"))
    .append_header((header::CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame"))
    .streaming(stream)
}

async fn status_handler<M: PpeModel>(state: web::Data<ServerState<M>>) -> HttpResponse {
  let view_state = state.clone();
  let single = match web::block(move || SingleShotView::of(&view_state.lock_single())).await {
    Ok(single) => single,
    Err(e) => return blocking_failed(e),
  };
  let live = state
    .live
    .slot()
    .lock()
    .ok()
    .and_then(|guard| guard.as_ref().map(|packet| packet.detections.clone()))
    .unwrap_or_default();

  HttpResponse::Ok().json(json!({
    "single": single,
    "streaming": state.streaming.status(),
    "live_detections": live,
    "server_time": Local::now().to_rfc3339(),
  }))
}
