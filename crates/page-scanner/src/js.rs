//! In-page scripts the scanner evaluates.
//!
//! Each script is self-contained and returns a JSON string so the host side
//! stays a plain parse. The identity attribute is written inside the page:
//! the element the script tagged is, by construction, the element a later
//! attribute-selector query resolves.

/// Main scan pass. Clears residual identity attributes, walks the union
/// selector in document order, bubbles img/div/span/svg candidates up to an
/// enclosing anchor/button, derives labels, dedupes hrefs, and tags every
/// emitted element with a fresh `element-XXXXXXXX` identity.
pub const SCAN_JS: &str = r#"
(() => {
  const ATTR = 'data-webpilot-id';
  try {
    document.querySelectorAll('[' + ATTR + ']').forEach((el) => el.removeAttribute(ATTR));
  } catch (e) {}
  const SELECTOR = [
    'button',
    '[role="button"]',
    'a[href]',
    'input:not([type="hidden"])',
    'textarea',
    'select',
    '[role="link"]',
    '[role="checkbox"]',
    '[role="radio"]',
  ].join(',');
  const seenHrefs = new Set();
  const out = [];
  const renderedRect = (el) => {
    const style = window.getComputedStyle(el);
    if (style.display === 'none' || style.visibility === 'hidden') return null;
    const rect = el.getBoundingClientRect();
    if (rect.width < 5 || rect.height < 5) return null;
    return rect;
  };
  const labelFor = (el) => {
    let label =
      el.getAttribute('aria-label') ||
      el.getAttribute('name') ||
      el.getAttribute('placeholder') ||
      (el.innerText || '').trim();
    if (!label) {
      const img = el.querySelector('img');
      if (img) label = img.alt ? 'Image: ' + img.alt : 'Unlabeled Image';
    }
    return (label || '').replace(/\s+/g, ' ').trim().slice(0, 100);
  };
  const freshId = () =>
    'element-' +
    Array.from(crypto.getRandomValues(new Uint8Array(4)))
      .map((b) => b.toString(16).padStart(2, '0'))
      .join('');
  for (let el of Array.from(document.querySelectorAll(SELECTOR))) {
    let rect = renderedRect(el);
    if (!rect) continue;
    const tag = el.tagName.toLowerCase();
    if (tag === 'img' || tag === 'div' || tag === 'span' || tag === 'svg') {
      let cur = el;
      for (let i = 0; i < 3 && cur.parentElement; i++) {
        cur = cur.parentElement;
        const ptag = cur.tagName.toLowerCase();
        if (ptag === 'a' || ptag === 'button') {
          el = cur;
          rect = el.getBoundingClientRect();
          break;
        }
      }
    }
    if (el.hasAttribute(ATTR)) continue;
    const label = labelFor(el);
    if (!label) continue;
    const href = el.tagName.toLowerCase() === 'a' ? el.getAttribute('href') : null;
    if (href) {
      if (seenHrefs.has(href)) continue;
      seenHrefs.add(href);
    }
    const id = freshId();
    el.setAttribute(ATTR, id);
    out.push({
      id,
      label,
      tag: el.tagName.toLowerCase(),
      role: el.getAttribute('role'),
      type: el.getAttribute('type'),
      x: rect.x,
      y: rect.y,
      w: rect.width,
      h: rect.height,
      href,
    });
  }
  return JSON.stringify(out);
})()
"#;

/// Cursor:pointer sweep used when the main pass finds too few regions.
/// Skips anything already tagged or nested inside a tagged element.
pub const POINTER_SWEEP_JS: &str = r#"
(() => {
  const ATTR = 'data-webpilot-id';
  const out = [];
  const freshId = () =>
    'element-' +
    Array.from(crypto.getRandomValues(new Uint8Array(4)))
      .map((b) => b.toString(16).padStart(2, '0'))
      .join('');
  for (const el of Array.from(document.querySelectorAll('*'))) {
    if (out.length >= 40) break;
    if (el.hasAttribute(ATTR) || el.closest('[' + ATTR + ']')) continue;
    const style = window.getComputedStyle(el);
    if (style.cursor !== 'pointer') continue;
    if (style.display === 'none' || style.visibility === 'hidden') continue;
    const rect = el.getBoundingClientRect();
    if (rect.width < 5 || rect.height < 5) continue;
    if (rect.bottom < 0 || rect.top > window.innerHeight) continue;
    const label = ((el.innerText || el.getAttribute('aria-label') || '')
      .replace(/\s+/g, ' ')
      .trim())
      .slice(0, 100);
    if (!label) continue;
    const id = freshId();
    el.setAttribute(ATTR, id);
    out.push({
      id,
      label,
      tag: el.tagName.toLowerCase(),
      role: el.getAttribute('role'),
      type: el.getAttribute('type'),
      x: rect.x,
      y: rect.y,
      w: rect.width,
      h: rect.height,
      href: null,
    });
  }
  return JSON.stringify(out);
})()
"#;

/// Center point of the element carrying the given identity, or null.
pub fn center_of(identity: &str) -> String {
    format!(
        r#"
(() => {{
  const el = document.querySelector('[data-webpilot-id="{identity}"]');
  if (!el) return JSON.stringify(null);
  const rect = el.getBoundingClientRect();
  return JSON.stringify({{ x: rect.x + rect.width / 2, y: rect.y + rect.height / 2 }});
}})()
"#
    )
}
