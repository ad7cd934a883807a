//! Chat/email text rendering. Near-direct port of
//! `original_source/notifier-service/dispatcher/utils/formatters.py`:
//! same field order, same Russian-language template, same dash-for-missing
//! convention.

use common::ProbeEvent;

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "\u{2014}".to_string(),
    }
}

fn dns_text(resolved: bool) -> &'static str {
    if resolved {
        "OK"
    } else {
        "FAIL"
    }
}

fn explanation(event: &ProbeEvent) -> &str {
    event.explanation.as_deref().unwrap_or("").trim()
}

pub fn format_telegram(event: &ProbeEvent) -> String {
    let logs = &event.logs;
    let mut text = format!(
        "<b>{name}</b> ({url})\n\
         {icon} Светофор: {tl}\n\n\
         🕒 Время: {ts}\n\
         📡 Код ответа: {status}\n\
         ⚡ Задержка HTTP: {latency} мс\n\
         📶 Пинг: {ping} мс\n\
         🔐 SSL дней осталось: {ssl}\n\
         🌐 DNS резолвинг: {dns}\n\
         ↪️ Редиректы: {redirects}\n\
         ❗ Ошибки (последние проверки): {errors}\n",
        name = event.name,
        url = event.url,
        icon = logs.traffic_light.icon(),
        tl = logs.traffic_light.upper(),
        ts = logs.timestamp,
        status = fmt_opt(logs.http_status),
        latency = fmt_opt(logs.latency_ms),
        ping = fmt_opt(logs.ping_ms),
        ssl = fmt_opt(logs.ssl_days_left),
        dns = dns_text(logs.dns_resolved),
        redirects = fmt_opt(logs.redirects),
        errors = fmt_opt(logs.errors_last),
    );

    let explanation = explanation(event);
    if !explanation.is_empty() {
        text.push_str(&format!("\n💬 <b>Вердикт LLM</b>\n{}", explanation));
    }
    text
}

pub fn format_email_subject(event: &ProbeEvent) -> String {
    format!("[{}] {} — статус обновлён", event.logs.traffic_light.upper(), event.name)
}

pub fn format_email_bodies(event: &ProbeEvent) -> (String, String) {
    let logs = &event.logs;
    let explanation = explanation(event);

    let mut plain_lines = vec![
        format!("{} ({})", event.name, event.url),
        format!("Светофор: {}", logs.traffic_light.upper()),
        String::new(),
        format!("Время: {}", logs.timestamp),
        format!("Код ответа: {}", fmt_opt(logs.http_status)),
        format!("Задержка HTTP: {} мс", fmt_opt(logs.latency_ms)),
        format!("Пинг: {} мс", fmt_opt(logs.ping_ms)),
        format!("SSL дней осталось: {}", fmt_opt(logs.ssl_days_left)),
        format!("DNS резолвинг: {}", dns_text(logs.dns_resolved)),
        format!("Редиректы: {}", fmt_opt(logs.redirects)),
        format!("Ошибки (последние проверки): {}", fmt_opt(logs.errors_last)),
    ];
    if !explanation.is_empty() {
        plain_lines.push(String::new());
        plain_lines.push("Вердикт LLM:".to_string());
        plain_lines.push(explanation.to_string());
    }
    let plain_text = plain_lines.join("\n");

    let mut html = String::new();
    html.push_str("<html><body>");
    html.push_str(&format!("<h3>{} ({})</h3>", escape(&event.name), escape(&event.url)));
    html.push_str(&format!("<p><strong>Светофор:</strong> {}</p>", escape(logs.traffic_light.upper())));
    html.push_str("<table style='border-collapse: collapse;'>");
    html.push_str(&html_row("Время", &logs.timestamp));
    html.push_str(&html_row("Код ответа", &fmt_opt(logs.http_status)));
    html.push_str(&html_row("Задержка HTTP", &format!("{} мс", fmt_opt(logs.latency_ms))));
    html.push_str(&html_row("Пинг", &format!("{} мс", fmt_opt(logs.ping_ms))));
    html.push_str(&html_row("SSL дней осталось", &fmt_opt(logs.ssl_days_left)));
    html.push_str(&html_row("DNS резолвинг", dns_text(logs.dns_resolved)));
    html.push_str(&html_row("Редиректы", &fmt_opt(logs.redirects)));
    html.push_str(&html_row("Ошибки (последние проверки)", &fmt_opt(logs.errors_last)));
    html.push_str("</table>");
    if !explanation.is_empty() {
        html.push_str(&format!("<p><strong>Вердикт LLM:</strong><br>{}</p>", escape(explanation)));
    }
    html.push_str("</body></html>");

    (plain_text, html)
}

fn html_row(label: &str, value: &str) -> String {
    format!(
        "<tr><td style='padding:4px 8px;border:1px solid #ddd;'><strong>{}</strong></td><td style='padding:4px 8px;border:1px solid #ddd;'>{}</td></tr>",
        escape(label),
        escape(value)
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Com, ProbeSnapshot, TrafficLight};

    fn event(explanation: Option<&str>) -> ProbeEvent {
        ProbeEvent {
            id: 1,
            url: "https://example.com".to_string(),
            name: "Example".to_string(),
            com: Com::default(),
            logs: ProbeSnapshot {
                timestamp: "2026-08-01T00:00:00".to_string(),
                traffic_light: TrafficLight::Red,
                http_status: Some(503),
                latency_ms: Some(120),
                ping_ms: Some(15.0),
                ssl_days_left: Some(40),
                dns_resolved: true,
                redirects: Some(0),
                errors_last: Some(2),
            },
            explanation: explanation.map(|s| s.to_string()),
        }
    }

    #[test]
    fn telegram_omits_verdict_without_explanation() {
        let text = format_telegram(&event(None));
        assert!(!text.contains("Вердикт LLM"));
        assert!(text.contains("RED"));
        assert!(text.contains("503"));
    }

    #[test]
    fn telegram_appends_verdict_when_present() {
        let text = format_telegram(&event(Some("site is down")));
        assert!(text.contains("Вердикт LLM"));
        assert!(text.contains("site is down"));
    }

    #[test]
    fn subject_includes_traffic_light_and_name() {
        let subject = format_email_subject(&event(None));
        assert!(subject.starts_with("[RED]"));
        assert!(subject.contains("Example"));
    }

    #[test]
    fn html_body_escapes_name() {
        let mut e = event(None);
        e.name = "<script>".to_string();
        let (_, html) = format_email_bodies(&e);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn plain_body_lists_fields_in_order() {
        let (plain, _) = format_email_bodies(&event(None));
        let status_idx = plain.find("Код ответа").unwrap();
        let ping_idx = plain.find("Пинг").unwrap();
        assert!(status_idx < ping_idx);
    }
}
