use monitor_core::{Alert, Severity};

pub struct EmailTemplate;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl EmailTemplate {
    pub fn subject(alert: &Alert) -> String {
        alert.title()
    }

    pub fn render(alert: &Alert) -> String {
        let header_color = match alert.severity {
            Severity::High => "#ef4444",
            Severity::Medium => "#f97316",
        };
        let check = escape(&alert.check_name);
        let severity = alert.severity;
        let current = alert.current_rate * 100.0;
        let baseline = alert.baseline_rate * 100.0;
        let drop = alert.drop() * 100.0;
        let window = format!(
            "{} to {} UTC",
            alert.window_start.format("%Y-%m-%d %H:%M"),
            alert.window_end.format("%Y-%m-%d %H:%M")
        );

        let body_content = format!(
            r#"<div style="background:{header_color};color:#fff;padding:12px 20px;border-radius:8px 8px 0 0;font-size:18px;font-weight:700;">{severity} REGRESSION &ndash; {check}</div>
<table style="width:100%;border-collapse:collapse;">
  <tr><td style="padding:8px 12px;color:#94a3b8;">Sub-check</td><td style="padding:8px 12px;font-weight:600;">{check}</td></tr>
  <tr style="background:#f8fafc;"><td style="padding:8px 12px;color:#94a3b8;">Current clear rate</td><td style="padding:8px 12px;font-weight:600;color:{header_color};">{current:.1}%</td></tr>
  <tr><td style="padding:8px 12px;color:#94a3b8;">Baseline</td><td style="padding:8px 12px;font-weight:600;">{baseline:.1}%</td></tr>
  <tr style="background:#f8fafc;"><td style="padding:8px 12px;color:#94a3b8;">Drop</td><td style="padding:8px 12px;font-weight:600;color:{header_color};">-{drop:.1} pts</td></tr>
  <tr><td style="padding:8px 12px;color:#94a3b8;">Window</td><td style="padding:8px 12px;">{window}</td></tr>
</table>"#
        );

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1"></head>
<body style="margin:0;padding:0;background:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;">
<table width="100%" cellpadding="0" cellspacing="0" style="background:#f1f5f9;padding:32px 0;">
  <tr><td align="center">
    <table width="600" cellpadding="0" cellspacing="0" style="background:#ffffff;border-radius:8px;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,0.1);">
      <tr><td>
        {body_content}
      </td></tr>
      <tr><td style="padding:16px 20px;border-top:1px solid #e2e8f0;">
        <p style="margin:0;color:#94a3b8;font-size:12px;">
          {msg}
          <br>Detected at {ts} UTC
        </p>
      </td></tr>
    </table>
    <p style="color:#94a3b8;font-size:11px;margin-top:16px;">KYC Sub-Check Monitor</p>
  </td></tr>
</table>
</body>
</html>"#,
            msg = escape(&alert.message()),
            ts = alert.detected_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}
