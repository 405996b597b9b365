//! Control page served at `/`.

/// Live view with brightness, contrast, night mode and snapshot controls.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Webcam preview</title>
<style>
  body { font-family: sans-serif; background: #111; color: #eee; margin: 0; padding: 1rem; }
  main { max-width: 960px; margin: 0 auto; }
  img { width: 100%; background: #000; border-radius: 4px; }
  .controls { display: grid; grid-template-columns: 8rem 1fr 4rem; gap: 0.5rem; align-items: center; margin-top: 1rem; }
  button { padding: 0.5rem 1rem; margin-top: 1rem; }
  #status { color: #9c9; margin-left: 1rem; }
</style>
</head>
<body>
<main>
  <img src="/video_feed" alt="live stream">
  <div class="controls">
    <label for="brightness">Brightness</label>
    <input id="brightness" type="range" min="-50" max="50" step="1" value="0">
    <span id="brightness-value">0</span>
    <label for="contrast">Contrast</label>
    <input id="contrast" type="range" min="0.5" max="2.0" step="0.1" value="1.0">
    <span id="contrast-value">1.0</span>
    <label for="night">Night mode</label>
    <input id="night" type="checkbox">
    <span></span>
  </div>
  <button id="capture">Save snapshot</button>
  <span id="status"></span>
</main>
<script>
  const $ = (id) => document.getElementById(id);

  async function post(path, body) {
    const res = await fetch(path, {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify(body),
    });
    const data = await res.json();
    if (!res.ok) throw new Error(data.error || res.statusText);
    return data;
  }

  function show(state) {
    $("brightness").value = state.brightness;
    $("brightness-value").textContent = state.brightness;
    $("contrast").value = state.contrast;
    $("contrast-value").textContent = Number(state.contrast).toFixed(1);
    $("night").checked = state.night_mode;
    $("status").textContent = state.fps.toFixed(1) + " fps, " + state.frames + " frames";
  }

  $("brightness").addEventListener("change", (e) =>
    post("/api/brightness", { value: parseInt(e.target.value, 10) }).then(show));
  $("contrast").addEventListener("change", (e) =>
    post("/api/contrast", { value: parseFloat(e.target.value) }).then(show));
  $("night").addEventListener("change", (e) =>
    post("/api/night_mode", { enabled: e.target.checked }).then(show));
  $("capture").addEventListener("click", () =>
    post("/api/capture", {})
      .then((data) => { $("status").textContent = "saved " + data.path; })
      .catch((err) => { $("status").textContent = err.message; }));

  setInterval(() => fetch("/api/state").then((r) => r.json()).then(show), 2000);
  fetch("/api/state").then((r) => r.json()).then(show);
</script>
</body>
</html>
"#;
