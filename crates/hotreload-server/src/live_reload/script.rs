//! Browser client for live reload.
//!
//! The served script opens a WebSocket to the live reload endpoint, reloads
//! the page on a `reload` frame and reconnects whenever the socket closes.

use std::time::Duration;

use super::broadcast::RELOAD_MESSAGE;

/// Client script template. Placeholders are JSON literals.
const CLIENT_TEMPLATE: &str = r"(function () {
  var protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
  var url = protocol + '//' + window.location.host + __WS_PATH__;
  var reloadMessage = __RELOAD_MESSAGE__;
  var reconnectInterval = __RECONNECT_INTERVAL__;

  function connect() {
    var socket = new WebSocket(url);
    socket.onmessage = function (event) {
      if (event.data === reloadMessage) {
        window.location.reload();
      }
    };
    socket.onclose = function () {
      setTimeout(connect, reconnectInterval);
    };
  }

  connect();
})();
";

/// Render the client script for the given endpoint and reconnect interval.
pub(crate) fn client_script(ws_path: &str, reconnect_interval: Duration) -> String {
    let interval_ms = u64::try_from(reconnect_interval.as_millis()).unwrap_or(u64::MAX);

    CLIENT_TEMPLATE
        .replace("__WS_PATH__", &json_string(ws_path))
        .replace("__RELOAD_MESSAGE__", &json_string(RELOAD_MESSAGE))
        .replace("__RECONNECT_INTERVAL__", &interval_ms.to_string())
}

/// HTML fragment that loads the client script.
pub(crate) fn script_tag(script_path: &str) -> String {
    format!(r#"<script src="{script_path}" defer></script>"#)
}

/// Quote `value` as a JSON string literal, which is also valid JavaScript.
fn json_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_script_embeds_settings() {
        let script = client_script("/__hotreload__", Duration::from_millis(1500));

        assert!(script.contains(r#"window.location.host + "/__hotreload__""#));
        assert!(script.contains(r#"var reloadMessage = "reload";"#));
        assert!(script.contains("var reconnectInterval = 1500;"));
        assert!(script.contains("window.location.reload()"));
        assert!(!script.contains("__WS_PATH__"));
    }

    #[test]
    fn test_client_script_quotes_path() {
        let script = client_script("/ws\"x", Duration::from_secs(1));

        assert!(script.contains(r#""/ws\"x""#));
    }

    #[test]
    fn test_script_tag() {
        assert_eq!(
            script_tag("/__hotreload__/client.js"),
            r#"<script src="/__hotreload__/client.js" defer></script>"#
        );
    }
}
