//! Scoped console interception

use rquickjs::Ctx;

const INSTALL: &str = r#"
(function () {
  globalThis.__hostConsole = globalThis.console;
  globalThis.__capturedLogs = [];
  var render = function (value) {
    if (typeof value === 'string') return value;
    if (value === undefined || typeof value === 'function' || typeof value === 'symbol') {
      return String(value);
    }
    try {
      var json = JSON.stringify(value);
      return json === undefined ? String(value) : json;
    } catch (_) {
      return String(value);
    }
  };
  var capture = function (prefix) {
    return function () {
      var parts = [];
      for (var i = 0; i < arguments.length; i++) parts.push(render(arguments[i]));
      globalThis.__capturedLogs.push(prefix + parts.join(' '));
    };
  };
  globalThis.console = {
    log: capture(''),
    info: capture(''),
    debug: capture(''),
    warn: capture('Warning: '),
    error: capture('Error: ')
  };
})();
"#;

const DRAIN: &str = r#"
(function () {
  var logs = globalThis.__capturedLogs || [];
  globalThis.__capturedLogs = [];
  return logs.join('\n');
})()
"#;

const RESTORE: &str = r#"
(function () {
  if (globalThis.__hostConsole === undefined) {
    delete globalThis.console;
  } else {
    globalThis.console = globalThis.__hostConsole;
  }
  delete globalThis.__hostConsole;
  delete globalThis.__capturedLogs;
})();
"#;

/// Console interception held for the lifetime of the guard
///
/// Installing saves the current `console` binding and replaces it with one
/// that buffers every line. Dropping the guard puts the saved binding back,
/// on every exit path.
pub struct ConsoleCapture<'js> {
    ctx: Ctx<'js>,
}

impl<'js> ConsoleCapture<'js> {
    pub fn install(ctx: &Ctx<'js>) -> rquickjs::Result<Self> {
        ctx.eval::<(), _>(INSTALL)?;
        Ok(Self { ctx: ctx.clone() })
    }

    /// Take everything logged since the last drain
    pub fn drain(&self) -> String {
        self.ctx.eval::<String, _>(DRAIN).unwrap_or_default()
    }
}

impl Drop for ConsoleCapture<'_> {
    fn drop(&mut self) {
        let _ = self.ctx.eval::<(), _>(RESTORE);
    }
}
