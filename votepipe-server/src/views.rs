//! Server-rendered pages. Labels come from configuration and are escaped
//! before they reach the markup.

use votepipe_config::BallotConfig;
use votepipe_model::Choice;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Ballot page. `vote` marks the option this client last submitted.
pub fn ballot_page(ballot: &BallotConfig, instance: &str, vote: Option<Choice>) -> String {
    let title = format!(
        "{} vs {}!",
        escape_html(&ballot.option_a),
        escape_html(&ballot.option_b)
    );
    let buttons: String = Choice::ALL
        .iter()
        .map(|choice| {
            let checked = if vote == Some(*choice) {
                r#" class="chosen" aria-pressed="true""#
            } else {
                ""
            };
            format!(
                r#"<button id="{key}" name="vote" value="{key}" type="submit"{checked}>{label}</button>"#,
                key = choice.as_str(),
                label = escape_html(ballot.label(*choice)),
            )
        })
        .collect::<Vec<_>>()
        .join("\n        ");
    let tip = match vote {
        Some(choice) => format!(
            r#"<p class="tip">Your vote for {} was recorded. You can change it at any time.</p>"#,
            escape_html(ballot.label(choice))
        ),
        None => r#"<p class="tip">(Tip: you can change your vote)</p>"#.to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
  </head>
  <body>
    <main>
      <h3>{title}</h3>
      <form method="POST" action="/">
        {buttons}
      </form>
      {tip}
    </main>
    <footer>Processed by instance {instance}</footer>
  </body>
</html>
"#,
        instance = escape_html(instance),
    )
}

/// Results page. Counts arrive over `/ws` as `scores` events whose `data`
/// is the JSON-encoded mapping.
pub fn results_page(ballot: &BallotConfig) -> String {
    let a = escape_html(&ballot.option_a);
    let b = escape_html(&ballot.option_b);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{a} vs {b} -- Result</title>
  </head>
  <body>
    <main>
      <section id="choice-a"><h2>{a}</h2><p class="percent" id="percent-a">50.0%</p></section>
      <section id="choice-b"><h2>{b}</h2><p class="percent" id="percent-b">50.0%</p></section>
      <p id="total">No votes yet</p>
    </main>
    <script>
      (function () {{
        const scheme = location.protocol === "https:" ? "wss://" : "ws://";
        function connect() {{
          const socket = new WebSocket(scheme + location.host + "/ws");
          socket.onmessage = function (msg) {{
            const event = JSON.parse(msg.data);
            if (event.event !== "scores") return;
            const counts = JSON.parse(event.data);
            const a = counts.a || 0;
            const b = counts.b || 0;
            const total = a + b;
            const pa = total === 0 ? 50 : (a / total) * 100;
            document.getElementById("percent-a").textContent = pa.toFixed(1) + "%";
            document.getElementById("percent-b").textContent = (100 - pa).toFixed(1) + "%";
            document.getElementById("total").textContent =
              total === 0 ? "No votes yet" : total === 1 ? "1 vote" : total + " votes";
          }};
          socket.onclose = function () {{ setTimeout(connect, 1000); }};
        }}
        connect();
      }})();
    </script>
  </body>
</html>
"#
    )
}
