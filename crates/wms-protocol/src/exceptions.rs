//! OGC service exception reports.
//!
//! Servers report request failures as XML instead of the expected payload,
//! often with HTTP 200. Both the WMS `ServiceExceptionReport` and the OWS
//! `ExceptionReport` shapes are recognised.

use quick_xml::events::Event;
use quick_xml::Reader;

use wms_common::{WmsError, WmsResult};

use crate::capabilities::attribute;

/// MIME types servers use for exception bodies.
const EXCEPTION_MIME_TYPES: &[&str] = &[
    "application/vnd.ogc.se_xml",
    "application/vnd.ogc.se+xml",
    "application/vnd.ogc.wms_xml",
    "text/xml",
    "application/xml",
];

/// One `<ServiceException>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceException {
    pub code: Option<String>,
    pub locator: Option<String>,
    pub message: String,
}

impl From<ServiceException> for WmsError {
    fn from(exception: ServiceException) -> Self {
        WmsError::Service {
            code: exception.code,
            message: exception.message,
        }
    }
}

/// Parse every exception in a report.
///
/// Fails with [`WmsError::Protocol`] if `xml` is not an exception report.
pub fn parse_exception_report(xml: &str) -> WmsResult<Vec<ServiceException>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut is_report = false;
    let mut exceptions = Vec::new();
    let mut current: Option<ServiceException> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| WmsError::Protocol(format!("Invalid exception report: {}", e)))?;

        let self_closing = matches!(event, Event::Empty(_));

        match event {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"ServiceExceptionReport" | b"ExceptionReport" => is_report = true,
                b"ServiceException" | b"Exception" if is_report => {
                    let code = match attribute(&e, b"code")? {
                        Some(code) => Some(code),
                        None => attribute(&e, b"exceptionCode")?,
                    };
                    let exception = ServiceException {
                        code,
                        locator: attribute(&e, b"locator")?,
                        message: String::new(),
                    };
                    // A self-closing entry has no message to wait for.
                    if self_closing {
                        exceptions.push(exception);
                    } else {
                        current = Some(exception);
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some(exception) = current.as_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| WmsError::Protocol(format!("Invalid text: {}", e)))?;
                    if !exception.message.is_empty() {
                        exception.message.push(' ');
                    }
                    exception.message.push_str(text.trim());
                }
            }
            Event::CData(t) => {
                if let Some(exception) = current.as_mut() {
                    exception
                        .message
                        .push_str(String::from_utf8_lossy(&t.into_inner()).trim());
                }
            }
            Event::End(e) => {
                if matches!(e.local_name().as_ref(), b"ServiceException" | b"Exception") {
                    if let Some(exception) = current.take() {
                        exceptions.push(exception);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !is_report {
        return Err(WmsError::Protocol(
            "Response is not a service exception report".to_string(),
        ));
    }

    Ok(exceptions)
}

/// Turn an exception report body into the error it describes.
///
/// Reports with several entries keep the first code and join the messages.
pub fn service_error(xml: &str) -> WmsError {
    match parse_exception_report(xml) {
        Ok(exceptions) if !exceptions.is_empty() => {
            let code = exceptions[0].code.clone();
            let message = exceptions
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            WmsError::Service { code, message }
        }
        Ok(_) => WmsError::Service {
            code: None,
            message: "empty exception report".to_string(),
        },
        Err(err) => err,
    }
}

/// Whether a response with this content type and body carries an exception
/// report rather than the requested payload.
pub fn is_exception_response(content_type: Option<&str>, body: &[u8]) -> bool {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    let xml_typed = mime
        .as_deref()
        .map(|m| EXCEPTION_MIME_TYPES.contains(&m))
        .unwrap_or(false);
    if !xml_typed && mime.is_some() {
        return false;
    }

    let head = String::from_utf8_lossy(&body[..body.len().min(512)]);
    head.contains("ServiceExceptionReport") || head.contains("ExceptionReport")
}
