// 该文件是 SafeGear （安全装备检测） 项目的一部分。
// src/server/page.rs - 单页界面
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

pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>SafeGear Detector</title>
<style>
  body { font-family: sans-serif; margin: 0; display: flex; min-height: 100vh; }
  aside { width: 260px; padding: 1.5em; background: #f3f5f3; }
  main { flex: 1; padding: 1.5em 2em; }
  button { background-color: #4CAF50; color: white; height: 3em; width: 10em;
           border-radius: 10px; border: none; font-size: 16px; font-weight: bold; cursor: pointer; }
  button:disabled { background-color: #9bc99d; cursor: default; }
  img { max-width: 100%; border-radius: 15px; border: 2px solid #4CAF50; }
  .row { display: flex; gap: 1.5em; flex-wrap: wrap; }
  .col { flex: 1; min-width: 320px; }
  .notice { margin: 1em 0; padding: 0.6em 1em; border-radius: 8px; background: #eef7ee; }
  .notice.error { background: #fbeaea; }
  .hidden { display: none; }
</style>
</head>
<body>
<aside>
  <h2>SafeGear Detector</h2>
  <p>Select Mode:</p>
  <label><input type="radio" name="mode" value="image" checked> Image Upload</label><br>
  <label><input type="radio" name="mode" value="webcam"> Webcam</label>
  <hr>
  <p><b>Instructions:</b></p>
  <ul>
    <li>Image Upload: upload an image and click <b>Detect PPE</b></li>
    <li>Webcam: click <b>Start Webcam</b> for real-time detection, <b>Stop</b> or ESC to end</li>
    <li>Recommended image size: 640x640</li>
  </ul>
</aside>
<main>
  <h1>SafeGear Detector</h1>
  <h3>Detect helmets, gloves, vests, boots &amp; goggles easily!</h3>

  <section id="image-mode">
    <input id="upload" type="file" accept=".jpg,.jpeg,.png,image/jpeg,image/png">
    <div id="image-notice" class="notice hidden"></div>
    <div class="row">
      <div class="col hidden" id="input-col">
        <p>Uploaded Image</p>
        <img id="input-image" alt="Uploaded Image">
        <p><button id="detect" disabled>Detect PPE</button></p>
      </div>
      <div class="col hidden" id="result-col">
        <p>Detection Result</p>
        <img id="result-image" alt="Detection Result">
        <ul id="detections"></ul>
      </div>
    </div>
  </section>

  <section id="webcam-mode" class="hidden">
    <p>Click below to start webcam inference</p>
    <button id="start">Start Webcam</button>
    <button id="stop" disabled>Stop</button>
    <div id="webcam-notice" class="notice hidden"></div>
    <div><img id="live" class="hidden" alt="Live Detection"></div>
  </section>
</main>
<script>
const $ = (id) => document.getElementById(id);

function notice(id, text, error) {
  const el = $(id);
  el.textContent = text || "";
  el.classList.toggle("hidden", !text);
  el.classList.toggle("error", !!error);
}

document.querySelectorAll("input[name=mode]").forEach((radio) => {
  radio.addEventListener("change", () => {
    const webcam = radio.value === "webcam" && radio.checked;
    $("image-mode").classList.toggle("hidden", webcam);
    $("webcam-mode").classList.toggle("hidden", !webcam);
    if (!webcam) { stopWebcam(); }
  });
});

$("upload").addEventListener("change", async () => {
  const file = $("upload").files[0];
  if (!file) { return; }
  $("result-col").classList.add("hidden");
  const resp = await fetch("/image", { method: "POST", body: file });
  const ok = resp.ok;
  $("input-col").classList.toggle("hidden", !ok);
  $("detect").disabled = !ok;
  if (ok) { $("input-image").src = "/image/input.jpg?t=" + Date.now(); }
  notice("image-notice", ok ? "" : "Could not read the uploaded image. Please upload a JPEG or PNG file.", !ok);
});

$("detect").addEventListener("click", async () => {
  $("detect").disabled = true;
  notice("image-notice", "Detecting...", false);
  const resp = await fetch("/detect", { method: "POST" });
  const body = await resp.json();
  $("detect").disabled = false;
  if (!resp.ok) {
    let text = "Detection failed, please try again.";
    if (resp.status === 409) {
      text = body.has_image ? "The image changed during detection, please detect again." : "Please upload an image first.";
    }
    notice("image-notice", text, true);
    return;
  }
  notice("image-notice", "Detection Complete! " + body.detections.length + " object(s) detected.", false);
  $("result-image").src = "/image/result.jpg?t=" + Date.now();
  $("result-col").classList.remove("hidden");
  $("detections").innerHTML = "";
  body.detections.forEach((d) => {
    const li = document.createElement("li");
    li.textContent = d.class + " " + (d.score * 100).toFixed(1) + "%";
    $("detections").appendChild(li);
  });
});

let polling = null;

const STOP_MESSAGES = {
  signal: "Webcam stopped.",
  frame_limit: "Webcam stopped.",
  capture: "Could not read from the webcam.",
  inference: "Detection failed, webcam stopped.",
  render: "Could not display the frame, webcam stopped.",
  panic: "Webcam stopped unexpectedly.",
};

function hideLive() {
  $("live").removeAttribute("src");
  $("live").classList.add("hidden");
}

async function refreshWebcam() {
  const resp = await fetch("/status");
  const status = (await resp.json()).streaming;
  const running = status.state === "running";
  $("start").disabled = running;
  $("stop").disabled = !running;
  if (running) {
    notice("webcam-notice", "Frames: " + status.frames + " (press ESC to stop)", false);
  } else if (status.state === "stopped") {
    const text = STOP_MESSAGES[status.reason] || "Webcam stopped.";
    notice("webcam-notice", text + " (" + status.frames + " frames)", status.failed);
    hideLive();
    clearInterval(polling);
    polling = null;
  }
}

$("start").addEventListener("click", async () => {
  const resp = await fetch("/webcam/start", { method: "POST" });
  if (!resp.ok) {
    notice("webcam-notice", resp.status === 409 ? "Webcam is already running." : "Could not start the webcam.", true);
    return;
  }
  $("live").src = "/webcam/stream.mjpg?t=" + Date.now();
  $("live").classList.remove("hidden");
  if (!polling) { polling = setInterval(refreshWebcam, 500); }
});

function stopWebcam() {
  fetch("/webcam/stop", { method: "POST" });
}

$("stop").addEventListener("click", stopWebcam);
document.addEventListener("keydown", (ev) => {
  if (ev.key === "Escape") { stopWebcam(); }
});
</script>
</body>
</html>
"#;
