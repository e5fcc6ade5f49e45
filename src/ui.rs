//! The single-page chat client served at `/`.
//!
//! Plain HTML and JavaScript against the JSON API; no build step. The page
//! keeps its session id in `localStorage` so a reload resumes the chat.

use crate::models::Theme;
use crate::theme::css_for;

pub fn render_page(title: &str) -> String {
    INDEX_HTML
        .replace("{{TITLE}}", &escape_html(title))
        .replace("{{THEME_CSS}}", &css_for(Theme::Default))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{{TITLE}}</title>
  <style id="theme">{{THEME_CSS}}</style>
  <style>
    *, *::before, *::after { box-sizing: border-box; }
    body {
      margin: 0; font-family: system-ui, -apple-system, sans-serif;
      background: var(--bg); color: var(--text);
      display: grid; grid-template-columns: 300px 1fr; height: 100vh;
    }
    aside { background: var(--bg-secondary); padding: 1rem; overflow-y: auto; }
    aside h2 { font-size: 0.95rem; margin: 1.2rem 0 0.4rem; }
    main { display: flex; flex-direction: column; height: 100vh; }
    header { padding: 0.8rem 1.2rem; border-bottom: 1px solid var(--bg-secondary); }
    header h1 { margin: 0; font-size: 1.3rem; }
    #messages { flex: 1; overflow-y: auto; padding: 1rem 1.2rem; }
    .msg { max-width: 75%; margin: 0.4rem 0; padding: 0.6rem 0.9rem; border-radius: 12px; white-space: pre-wrap; }
    .msg.user { margin-left: auto; background: var(--primary); color: #fff; }
    .msg.bot { background: var(--bg-secondary); }
    .msg.system { margin: 0.4rem auto; font-size: 0.85rem; opacity: 0.8; border: 1px dashed var(--primary); }
    .msg .ts { display: block; font-size: 0.7rem; opacity: 0.6; margin-top: 0.3rem; }
    pre { background: #1e1e1e; color: #f0f0f0; padding: 0.6rem; border-radius: 6px; overflow-x: auto; white-space: pre; }
    form { display: flex; gap: 0.5rem; padding: 0.8rem 1.2rem; border-top: 1px solid var(--bg-secondary); }
    textarea { flex: 1; resize: none; height: 3rem; padding: 0.5rem; font: inherit; border-radius: 8px; border: 1px solid #ccc; }
    button { background: var(--primary); color: #fff; border: none; border-radius: 8px; padding: 0.5rem 0.9rem; cursor: pointer; }
    button.secondary { background: transparent; color: var(--text); border: 1px solid var(--primary); }
    select, input[type=text] { width: 100%; padding: 0.35rem; margin-bottom: 0.4rem; }
    .row { display: flex; gap: 0.4rem; flex-wrap: wrap; margin-bottom: 0.4rem; }
    .saved { display: flex; justify-content: space-between; align-items: center; font-size: 0.85rem; margin: 0.2rem 0; }
    .saved span { cursor: pointer; text-decoration: underline; }
    #examples button { margin: 0.2rem; }
    #status { font-size: 0.8rem; opacity: 0.7; }
  </style>
</head>
<body>
  <aside>
    <h2>Model</h2>
    <select id="model"></select>
    <div id="status"></div>

    <h2>Theme</h2>
    <select id="theme-select"></select>
    <label><input type="checkbox" id="timestamps" /> Show timestamps</label><br />
    <label><input type="checkbox" id="use-rag" checked /> Use knowledge base</label>

    <h2>Conversation</h2>
    <div class="row">
      <button type="button" class="secondary" id="clear">Clear</button>
      <button type="button" class="secondary" id="new">New</button>
    </div>
    <select id="export-format">
      <option value="txt">Text</option>
      <option value="md">Markdown</option>
      <option value="json">JSON</option>
    </select>
    <button type="button" class="secondary" id="export">Export</button>

    <h2>Upload a text file</h2>
    <input type="file" id="file" accept=".txt,.md,.py,.js,.json" />

    <h2>Saved chats</h2>
    <input type="text" id="save-name" placeholder="Name for this chat" />
    <div class="row">
      <button type="button" id="save">Save</button>
      <button type="button" class="secondary" id="reindex">Rebuild index</button>
    </div>
    <div id="saved"></div>
  </aside>

  <main>
    <header><h1>{{TITLE}}</h1></header>
    <div id="messages"></div>
    <div id="examples"></div>
    <form id="composer">
      <textarea id="input" placeholder="Type your message..."></textarea>
      <button type="submit">Send</button>
    </form>
  </main>

  <script>
    const $ = (id) => document.getElementById(id);
    let sessionId = localStorage.getItem("smartbot.session");
    let prefs = {};

    async function api(method, path, body, raw) {
      const opts = { method, headers: {} };
      if (raw !== undefined) {
        opts.body = raw;
      } else if (body !== undefined) {
        opts.headers["Content-Type"] = "application/json";
        opts.body = JSON.stringify(body);
      }
      const res = await fetch(path, opts);
      const data = await res.json().catch(() => ({}));
      if (!res.ok) throw new Error((data.error && data.error.message) || res.statusText);
      return data;
    }

    function escapeHtml(s) {
      return s.replace(/[&<>"]/g, (c) => ({ "&": "&amp;", "<": "&lt;", ">": "&gt;", '"': "&quot;" }[c]));
    }

    function renderContent(text) {
      return escapeHtml(text).replace(/```(\w+)?\n([\s\S]*?)\n```/g, (_, lang, code) =>
        `<pre data-lang="${lang || "text"}"><code>${code}</code></pre>`);
    }

    function renderMessage(m) {
      const div = document.createElement("div");
      div.className = "msg " + m.kind;
      div.innerHTML = renderContent(m.content);
      if (prefs.show_timestamps) {
        const ts = document.createElement("span");
        ts.className = "ts";
        ts.textContent = new Date(m.timestamp).toLocaleTimeString();
        div.appendChild(ts);
      }
      $("messages").appendChild(div);
      if (prefs.auto_scroll !== false) $("messages").scrollTop = $("messages").scrollHeight;
    }

    function renderSession(session) {
      $("messages").innerHTML = "";
      session.messages.forEach(renderMessage);
      $("examples").style.display = session.messages.length <= 1 ? "block" : "none";
    }

    async function applyTheme(name) {
      const themes = await api("GET", "/api/themes");
      const t = themes.find((x) => x.name === name);
      if (t) $("theme").textContent = t.css;
    }

    async function openSession(create) {
      let data;
      if (!create && sessionId) {
        try { data = await api("GET", `/api/sessions/${sessionId}`); } catch (_) { data = null; }
      }
      if (!data) data = await api("POST", "/api/sessions");
      sessionId = data.session.id;
      localStorage.setItem("smartbot.session", sessionId);
      prefs = data.preferences;
      $("timestamps").checked = prefs.show_timestamps;
      $("theme-select").value = prefs.theme;
      $("export-format").value = prefs.export_format;
      await applyTheme(prefs.theme);
      renderSession(data.session);
    }

    async function send(text) {
      if (!text.trim()) return;
      renderMessage({ kind: "user", content: text, timestamp: new Date().toISOString() });
      $("examples").style.display = "none";
      try {
        const data = await api("POST", `/api/sessions/${sessionId}/messages`,
          { content: text, use_rag: $("use-rag").checked });
        renderMessage(data.message);
      } catch (e) {
        renderMessage({ kind: "system", content: "Error: " + e.message, timestamp: new Date().toISOString() });
      }
    }

    async function loadSaved() {
      const data = await api("GET", "/api/saved");
      const box = $("saved");
      box.innerHTML = "";
      data.sessions.forEach((s) => {
        const row = document.createElement("div");
        row.className = "saved";
        row.innerHTML = `<span title="${escapeHtml(s.description)}">${escapeHtml(s.name)} (${s.message_count})</span>`;
        row.querySelector("span").onclick = async () => {
          const session = await api("POST", `/api/saved/${s.id}/load`);
          sessionId = session.id;
          localStorage.setItem("smartbot.session", sessionId);
          renderSession(session);
        };
        const del = document.createElement("button");
        del.className = "secondary";
        del.textContent = "Delete";
        del.onclick = async () => { await api("DELETE", `/api/saved/${s.id}`); loadSaved(); };
        row.appendChild(del);
        box.appendChild(row);
      });
    }

    async function loadModels() {
      const data = await api("GET", "/api/models");
      $("model").innerHTML = data.models.map((m) =>
        `<option value="${m.key}" ${m.key === data.current ? "selected" : ""}>${escapeHtml(m.display_name)}${m.available ? "" : " (offline)"}</option>`).join("");
      const stats = await api("GET", "/api/stats");
      $("status").textContent =
        `${stats.rag.total_sessions} saved chats, ${stats.rag.indexed_documents} indexed messages` +
        (stats.rag.vector_search_available ? "" : " (text search)");
    }

    async function init() {
      const themes = await api("GET", "/api/themes");
      $("theme-select").innerHTML = themes.map((t) => `<option value="${t.name}">${t.name}</option>`).join("");
      const examples = await api("GET", "/api/examples");
      $("examples").innerHTML = "";
      examples.forEach((ex) => {
        const b = document.createElement("button");
        b.type = "button";
        b.className = "secondary";
        b.textContent = ex;
        b.onclick = () => send(ex);
        $("examples").appendChild(b);
      });
      await openSession(false);
      await loadModels();
      await loadSaved();
    }

    $("composer").onsubmit = (e) => {
      e.preventDefault();
      const text = $("input").value;
      $("input").value = "";
      send(text);
    };
    $("input").onkeydown = (e) => {
      if (e.key === "Enter" && !e.shiftKey) { e.preventDefault(); $("composer").requestSubmit(); }
    };
    $("model").onchange = async (e) => { await api("PUT", "/api/models/current", { model: e.target.value }); loadModels(); };
    $("theme-select").onchange = async (e) => {
      prefs = await api("PUT", `/api/sessions/${sessionId}/preferences`, { theme: e.target.value });
      applyTheme(prefs.theme);
    };
    $("timestamps").onchange = async (e) => {
      prefs = await api("PUT", `/api/sessions/${sessionId}/preferences`, { show_timestamps: e.target.checked });
      renderSession((await api("GET", `/api/sessions/${sessionId}`)).session);
    };
    $("export-format").onchange = async (e) => {
      prefs = await api("PUT", `/api/sessions/${sessionId}/preferences`, { export_format: e.target.value });
    };
    $("clear").onclick = async () => renderSession(await api("POST", `/api/sessions/${sessionId}/clear`));
    $("new").onclick = async () => {
      if (sessionId) await api("DELETE", `/api/sessions/${sessionId}`).catch(() => {});
      openSession(true);
    };
    $("export").onclick = () => {
      window.location = `/api/sessions/${sessionId}/export?format=${$("export-format").value}`;
    };
    $("save").onclick = async () => {
      try {
        await api("POST", `/api/sessions/${sessionId}/save`, { name: $("save-name").value });
        $("save-name").value = "";
        loadSaved();
        loadModels();
      } catch (e) { alert(e.message); }
    };
    $("reindex").onclick = async () => {
      const r = await api("POST", "/api/index/rebuild");
      alert(`Indexed ${r.indexed} chats`);
      loadModels();
    };
    $("file").onchange = async (e) => {
      const file = e.target.files[0];
      if (!file) return;
      try {
        const out = await api("POST",
          `/api/sessions/${sessionId}/upload?filename=${encodeURIComponent(file.name)}`,
          undefined, await file.arrayBuffer());
        renderMessage(out.message);
      } catch (err) { alert(err.message); }
      e.target.value = "";
    };

    init();
  </script>
</body>
</html>
"#;
