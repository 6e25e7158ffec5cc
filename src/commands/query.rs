//! `tailship query`: print past events, or follow live ones.
//!
//! ```bash
//! tailship query --start 1700000000 --tag prod --content timeout --order desc
//! tailship query --live --tag prod
//! ```

// Rust guideline compliant 2026-02

use std::future::Future;
use std::io::Write;

use anyhow::{Context, Result};

use crate::client::{EventResponse, EventStream};
use crate::filter::{EventFilter, FilterError, Order};
use crate::output;
use crate::Client;

/// Build a filter from command-line values.
///
/// An `end` of 0 and an empty `content` mean "not set", as do empty tags.
/// NaN and infinite time bounds are rejected.
pub fn build_filter(
    start: f64,
    end: Option<f64>,
    tags: Vec<String>,
    content: Option<String>,
    order: Option<Order>,
) -> Result<EventFilter, FilterError> {
    check_finite("start", start)?;
    if let Some(end) = end {
        check_finite("end", end)?;
    }
    Ok(EventFilter {
        start,
        end: end.filter(|end| *end != 0.0),
        tags: Some(tags).filter(|tags| !tags.is_empty()),
        content: content.filter(|content| !content.is_empty()),
        order,
    })
}

fn check_finite(field: &'static str, value: f64) -> Result<(), FilterError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FilterError::InvalidTime {
            field,
            value: value.to_string(),
        })
    }
}

/// Print every event of a bounded query. Returns how many were printed.
pub async fn find(
    client: &Client,
    filter: &EventFilter,
    template: &str,
    out: &mut impl Write,
) -> Result<usize> {
    let mut stream = client.find(filter).await.context("Query failed")?;
    let mut printed = 0;
    while let Some(response) = stream.recv().await {
        printed += print_response(response, template, out)?;
    }
    Ok(printed)
}

/// Print live events until `shutdown` resolves or the server goes away.
pub async fn follow<F>(
    client: &Client,
    filter: &EventFilter,
    template: &str,
    out: &mut impl Write,
    shutdown: F,
) -> Result<usize>
where
    F: Future<Output = Result<()>>,
{
    let mut stream = client.receive(filter).await.context("Subscription failed")?;
    let mut printed = 0;
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = &mut shutdown => {
                close_stream(&stream).await;
                res?;
                break;
            }
            response = stream.recv() => match response {
                Some(response) => printed += print_response(response, template, out)?,
                None => {
                    log::info!("Live stream ended by server");
                    break;
                }
            },
        }
    }
    Ok(printed)
}

async fn close_stream(stream: &EventStream) {
    if let Err(e) = stream.close("interrupted").await {
        log::debug!("Closing {} stream failed: {e}", stream.endpoint());
    }
}

/// Print an event, or log an in-band error. Returns 1 for a printed event.
fn print_response(response: EventResponse, template: &str, out: &mut impl Write) -> Result<usize> {
    match response {
        EventResponse::Event(event) => {
            output::print_event(out, &event, template).context("Failed to write event")?;
            Ok(1)
        }
        EventResponse::Error(e) => {
            log::error!("{e}");
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResponseError;
    use crate::event::Event;

    #[test]
    fn test_build_filter_treats_zero_and_empty_as_unset() {
        let filter =
            build_filter(10.0, Some(0.0), Vec::new(), Some(String::new()), None).unwrap();
        assert_eq!(filter, EventFilter::since(10.0));
        assert_eq!(filter.encode(), br#"{"start":10}"#);
    }

    #[test]
    fn test_build_filter_keeps_values() {
        let filter = build_filter(
            1.0,
            Some(2.5),
            vec!["prod".to_string()],
            Some("timeout".to_string()),
            Some(Order::Desc),
        )
        .unwrap();
        assert_eq!(filter.end, Some(2.5));
        assert_eq!(filter.tags, Some(vec!["prod".to_string()]));
        assert_eq!(filter.content.as_deref(), Some("timeout"));
        assert_eq!(filter.order, Some(Order::Desc));
    }

    #[test]
    fn test_build_filter_rejects_non_finite_bounds() {
        let nan = build_filter(f64::NAN, None, Vec::new(), None, None);
        assert!(matches!(nan, Err(FilterError::InvalidTime { field: "start", .. })));

        let inf = build_filter(0.0, Some(f64::INFINITY), Vec::new(), None, None);
        assert!(matches!(inf, Err(FilterError::InvalidTime { field: "end", .. })));
        assert!(inf.unwrap_err().to_string().contains("not a finite number"));
    }

    #[test]
    fn test_print_response_counts_only_events() {
        let mut out = Vec::new();
        let event = Event::new("src", "hello");
        assert_eq!(print_response(EventResponse::Event(event), "{content}", &mut out).unwrap(), 1);
        let error = EventResponse::Error(ResponseError::Server("nope".to_string()));
        assert_eq!(print_response(error, "{content}", &mut out).unwrap(), 0);
        assert_eq!(out, b"hello\n");
    }
}
