//! Scripts evaluated inside the document page.
//!
//! Each script starts with a `// larkdown:<name>` line so a page log (or a
//! test channel) can tell them apart.

/// Reports a [`Probe`](crate::readiness::Probe)
pub const PROBE: &str = r#"// larkdown:probe
(() => {
  const pm = window.PageMain;
  const root = pm && pm.blockManager && pm.blockManager.rootBlockModel;
  let blockCount = 0, textLength = 0, lazyBlocks = 0;
  if (root) {
    const stack = [root];
    while (stack.length && blockCount < 200000) {
      const block = stack.pop();
      blockCount++;
      const text = block.zoneState && block.zoneState.allText;
      if (typeof text === 'string') textLength += text.length;
      if (block.type === 'sheet') lazyBlocks++;
      for (const child of (block.children || [])) stack.push(child);
    }
  }
  const loginMarkers = !!document.querySelector(
    '[class*="login-page"], [class*="qrcode-login"], [class*="passport-login"]');
  let errorCode = null;
  const errorNode = document.querySelector('[class*="error-page"] [class*="code"], [class*="errorPage"] [class*="code"]');
  if (errorNode) {
    const m = (errorNode.textContent || '').match(/\b(4\d\d|5\d\d)\b/);
    if (m) errorCode = m[1];
  }
  return {
    href: location.href,
    readyState: document.readyState,
    hasModel: !!root,
    blockCount,
    textLength,
    loginMarkers,
    errorCode,
    lazyBlocks,
  };
})()"#;

/// Clicks away dialogs that cover the document; returns how many it closed
pub const DISMISS_POPUPS: &str = r#"// larkdown:dismiss
(() => {
  const labels = ['知道了', '我知道了', '确定', '关闭', '取消', 'Got it', 'OK', 'Close'];
  let closed = 0;
  for (const button of document.querySelectorAll('button, [role="button"]')) {
    const text = (button.textContent || '').trim();
    if (labels.includes(text) && button.offsetParent !== null) {
      button.click();
      closed++;
    }
  }
  for (const close of document.querySelectorAll('[class*="modal"] [class*="close"], [class*="dialog"] [class*="close"]')) {
    if (close.offsetParent !== null) {
      close.click();
      closed++;
    }
  }
  return closed;
})()"#;

/// One top-to-bottom pass over the scrollable document container, pausing at
/// each viewport so virtualized blocks render. Resolves to the final height.
pub const SCROLL_PASS: &str = r#"// larkdown:scroll
(async () => {
  const pause = (ms) => new Promise((resolve) => setTimeout(resolve, ms));
  const candidates = [
    document.querySelector('#docx > div'),
    document.querySelector('.bear-web-x-container'),
    document.scrollingElement,
  ];
  const container = candidates.find((el) => el && el.scrollHeight > el.clientHeight);
  if (!container) return 0;
  const step = Math.max(container.clientHeight, 400);
  for (let y = 0; y < container.scrollHeight; y += step) {
    container.scrollTop = y;
    await pause(150);
  }
  container.scrollTop = container.scrollHeight;
  await pause(300);
  container.scrollTop = 0;
  return container.scrollHeight;
})()"#;

/// Copies the document model into plain JSON text:
/// `{title, root, synced, sheets}` or `{error}`. A sheet the engine never
/// loaded is captured as `{dom: [[{text, style}]]}` from the drawn table.
pub const CAPTURE: &str = r#"// larkdown:capture
(() => {
  const pm = window.PageMain;
  const root = pm && pm.blockManager && pm.blockManager.rootBlockModel;
  if (!root) return JSON.stringify({ error: 'document model not found' });

  const MAX_DEPTH = 256;
  const synced = {};
  const sheetBlocks = [];

  const str = (v) => (typeof v === 'string' ? v : (v === undefined || v === null ? '' : String(v)));

  function ops(block) {
    const content = block.zoneState && block.zoneState.content;
    if (!content || !Array.isArray(content.ops)) return undefined;
    return content.ops.map((op) => ({
      insert: typeof op.insert === 'string' ? op.insert : '',
      attributes: op.attributes ? JSON.parse(JSON.stringify(op.attributes)) : undefined,
    }));
  }

  function data(block) {
    const s = block.snapshot || {};
    switch (block.type) {
      case 'table':
        return { columns: Array.isArray(s.columns_id) ? s.columns_id.length : undefined };
      case 'sheet':
        return { token: str(s.token) };
      case 'image':
        return { token: str(s.image && s.image.token), name: str(s.image && s.image.name) };
      case 'code':
        return { language: str(s.language || block.language) };
      case 'todo':
        return { done: !!s.done };
      case 'iframe':
        return { url: str(s.iframe && s.iframe.component && s.iframe.component.url) };
      case 'isv':
        return { data: typeof (s.data && s.data.data) === 'string' ? s.data.data : undefined };
      case 'synced_reference':
      case 'synced_source':
        return { sourceId: str(s.source_block_id || s.sourceId || s.source_id) };
      default:
        return undefined;
    }
  }

  const path = new Set();
  function walk(block, depth) {
    if (!block || depth > MAX_DEPTH || path.has(block)) return null;
    path.add(block);
    const text = block.zoneState && block.zoneState.allText;
    const node = {
      id: str(block.id !== undefined ? block.id : (block.record && block.record.id)),
      type: str(block.type),
      children: [],
      ops: ops(block),
      text: typeof text === 'string' ? text : undefined,
      data: data(block),
    };
    if (block.type === 'sheet') sheetBlocks.push(block);
    for (const child of (block.children || [])) {
      const childNode = walk(child, depth + 1);
      if (childNode) node.children.push(childNode);
    }
    if (block.type === 'synced_source' && node.id) synced[node.id] = node;
    path.delete(block);
    return node;
  }

  function plainStyle(style) {
    const keys = ['foreColor', '_foreColor', 'backColor', '_backColor', '_backgroundColor',
      'font', '_font', 'hAlign', '_hAlign', 'vAlign', '_vAlign', 'textDecoration', '_textDecoration',
      'borderLeft', 'borderTop', 'borderRight', 'borderBottom',
      '_borderLeft', '_borderTop', '_borderRight', '_borderBottom'];
    const out = {};
    for (const key of keys) {
      const value = style[key];
      if (value === undefined || value === null) continue;
      out[key] = typeof value === 'object' ? JSON.parse(JSON.stringify(value)) : value;
    }
    return out;
  }

  function readGrid(sheet) {
    const model = sheet._dataModel || {};
    const rowCount = model.rowCount || 0;
    const colCount = model.colCount || 0;
    const cells = [];
    const styles = {};
    const styleIds = new Map();
    for (let r = 0; r < rowCount; r++) {
      for (let c = 0; c < colCount; c++) {
        const cell = { r, c };
        let valueError = null;
        try {
          const value = sheet.getValue(r, c);
          if (value !== null && value !== undefined) cell.value = value;
        } catch (e) { valueError = e; }
        try {
          const text = sheet.getText(r, c);
          if (text) cell.text = str(text);
        } catch (e) {
          if (valueError) cell.error = str((e && e.message) || e);
        }
        try {
          const style = sheet.getStyle(r, c);
          if (style) {
            const plain = plainStyle(style);
            const key = JSON.stringify(plain);
            if (key !== '{}') {
              if (!styleIds.has(key)) {
                const id = String(styleIds.size + 1);
                styleIds.set(key, id);
                styles[id] = plain;
              }
              cell.style = styleIds.get(key);
            }
          }
        } catch (e) {}
        try {
          const content = model.contentModel && model.contentModel.get(r, c);
          const segments = content && content._segmentArray;
          if (segments && segments.length) {
            cell.segments = segments.map((seg) => ({
              text: str(seg.text !== undefined ? seg.text : seg.value),
              style: seg.style ? JSON.parse(JSON.stringify(seg.style)) : {},
            }));
          }
        } catch (e) {}
        if (cell.value !== undefined || cell.text || cell.segments || cell.error) cells.push(cell);
      }
    }
    return { rowCount, colCount, cells, styles };
  }

  function readSheets() {
    const out = {};
    const first = sheetBlocks[0];
    const manager = first && first.bridge && first.bridge.bridge && first.bridge.bridge.sheetManager;
    if (!manager || !manager.sheetComponents) return out;
    for (const [sheetId, component] of manager.sheetComponents) {
      try {
        const spread = component.props && component.props.collaSpread && component.props.collaSpread._spread;
        if (!spread) continue;
        const ids = spread.sheetIdToIndexMap;
        let index = -1;
        if (ids instanceof Map) index = ids.has(sheetId) ? ids.get(sheetId) : -1;
        else if (ids && ids[sheetId] !== undefined) index = ids[sheetId];
        const sheet = index >= 0 ? spread.sheets[index] : null;
        if (sheet) out[sheetId] = readGrid(sheet);
      } catch (e) {}
    }
    return out;
  }

  function readPageTable(blockId) {
    const el = document.querySelector('[data-block-id="' + CSS.escape(blockId) + '"]');
    const table = el && el.querySelector('table');
    if (!table) return null;
    return Array.from(table.querySelectorAll('tr')).map((row) =>
      Array.from(row.querySelectorAll('td, th')).map((cell) => ({
        text: str(cell.innerText).trim(),
        style: str(cell.getAttribute('style')),
      })));
  }

  const tree = walk(root, 0);
  let sheets = {};
  try { sheets = readSheets(); } catch (e) {}
  for (const block of sheetBlocks) {
    const token = str(block.snapshot && block.snapshot.token);
    if (!token || sheets[token] || sheets[token.split('_').pop()]) continue;
    try {
      const dom = readPageTable(str(block.id));
      if (dom && dom.length) sheets[token] = { dom };
    } catch (e) {}
  }

  let title = str(root.zoneState && root.zoneState.allText).trim();
  if (!title) title = document.title.replace(/\s+-\s+(飞书云文档|Feishu Docs|Feishu|Lark Docs|Lark)$/, '').trim();

  return JSON.stringify({ title, root: tree, synced, sheets });
})()"#;

/// Asks the page's image manager for a downloadable address.
/// `token` is inserted as a JSON string literal.
pub fn image_url(token: &str) -> String {
    let literal = serde_json::to_string(token).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"// larkdown:image
(async () => {{
  const token = {literal};
  const pm = window.PageMain;
  const root = pm && pm.blockManager && pm.blockManager.rootBlockModel;
  if (!root) return null;
  const stack = [root];
  let found = null;
  while (stack.length && !found) {{
    const block = stack.pop();
    const image = block.snapshot && block.snapshot.image;
    if (block.type === 'image' && image && image.token === token) found = block;
    for (const child of (block.children || [])) stack.push(child);
  }}
  const manager = found && found.imageManager;
  if (!manager || typeof manager.fetch !== 'function') return null;
  return await new Promise((resolve) => {{
    const timer = setTimeout(() => resolve(null), 10000);
    try {{
      manager.fetch({{ token, isHD: true, fuzzy: false }}, {{}}, (result) => {{
        clearTimeout(timer);
        resolve((result && (result.src || result.originSrc)) || null);
      }});
    }} catch (e) {{
      clearTimeout(timer);
      resolve(null);
    }}
  }});
}})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_are_tagged() {
        for (script, name) in [
            (PROBE, "probe"),
            (DISMISS_POPUPS, "dismiss"),
            (SCROLL_PASS, "scroll"),
            (CAPTURE, "capture"),
        ] {
            assert_eq!(script.lines().next(), Some(format!("// larkdown:{}", name).as_str()));
        }
    }

    #[test]
    fn test_image_script_quotes_token() {
        let script = image_url("box\"cn");
        assert!(script.starts_with("// larkdown:image\n"));
        assert!(script.contains(r#"const token = "box\"cn";"#));
    }

    #[test]
    fn test_capture_reads_page_tables_of_unloaded_sheets() {
        assert!(CAPTURE.contains("sheets[token] = { dom }"));
        assert!(CAPTURE.contains("querySelectorAll('td, th')"));
    }
}
