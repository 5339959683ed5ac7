//! Flat tag-based settings text.
//!
//! ```text
//! <Port>/dev/ttyUSB0</Port>
//! <Bps>9600</Bps>
//! <ByteSize>8</ByteSize>
//! <StopBits>1</StopBits>
//! <Parity>2</Parity>
//! ```
//!
//! Parity is written as its numeric code and omitted when `None`.

use crate::config::{ConfigError, ConfigResult};
use crate::port::{BaudRate, DataBits, Parity, PortSettings, StopBits};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt::Write as _;

/// Render line settings as settings text.
pub fn to_text(settings: &PortSettings) -> String {
    let mut out = String::new();
    if !settings.port_name.is_empty() {
        let _ = writeln!(out, "<Port>{}</Port>", escape(settings.port_name.as_str()));
    }
    let _ = writeln!(out, "<Bps>{}</Bps>", settings.baud_rate.bps());
    let _ = writeln!(out, "<ByteSize>{}</ByteSize>", u8::from(settings.data_bits));
    let _ = writeln!(out, "<StopBits>{}</StopBits>", settings.stop_bits.count());
    if settings.parity != Parity::None {
        let _ = writeln!(out, "<Parity>{}</Parity>", settings.parity.code());
    }
    out
}

/// Apply settings text on top of `settings`.
///
/// Blank input changes nothing and unknown tags are skipped. Nothing is
/// applied unless every recognised tag parses.
pub fn apply_text(settings: &mut PortSettings, text: &str) -> ConfigResult<()> {
    if text.trim().is_empty() {
        return Ok(());
    }

    let mut reader = Reader::from_str(text);
    let mut updated = settings.clone();
    let mut open: Vec<String> = Vec::new();
    let mut value = String::new();
    let mut leaf = false;
    let mut matched = 0;
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => {
                open.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                value.clear();
                leaf = true;
            }
            Event::Text(e) if leaf => value.push_str(&e.unescape().map_err(malformed)?),
            Event::CData(e) => {
                if leaf {
                    value.push_str(std::str::from_utf8(&e).map_err(malformed)?);
                }
            }
            Event::End(e) => {
                let close = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let Some(tag) = open.pop() else {
                    return Err(ConfigError::MalformedSettings(format!("stray </{close}>")));
                };
                if tag != close {
                    return Err(ConfigError::MalformedSettings(format!(
                        "<{tag}> closed by </{close}>"
                    )));
                }
                if leaf {
                    matched += 1;
                    apply_value(&mut updated, &tag, value.trim())?;
                }
                leaf = false;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(tag) = open.pop() {
        return Err(ConfigError::MalformedSettings(format!("<{tag}> is not closed")));
    }
    if matched == 0 && text.contains('<') {
        return Err(ConfigError::MalformedSettings(text.trim().to_string()));
    }
    *settings = updated;
    Ok(())
}

fn apply_value(settings: &mut PortSettings, tag: &str, value: &str) -> ConfigResult<()> {
    match tag {
        "Port" => settings.port_name = value.to_string(),
        "Bps" => {
            let bps = parse_number::<u32>(tag, value)?;
            settings.baud_rate = BaudRate::try_from(bps).map_err(|e| invalid(tag, e))?;
        }
        "ByteSize" => {
            let bits = parse_number::<u8>(tag, value)?;
            settings.data_bits = DataBits::try_from(bits).map_err(|e| invalid(tag, e))?;
        }
        "StopBits" => {
            settings.stop_bits = value.parse::<StopBits>().map_err(|e| invalid(tag, e))?;
        }
        "Parity" => {
            settings.parity = value.parse::<Parity>().map_err(|e| invalid(tag, e))?;
        }
        _ => {}
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(tag: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| invalid(tag, e))
}

fn malformed(err: impl std::fmt::Display) -> ConfigError {
    ConfigError::MalformedSettings(err.to_string())
}

fn invalid(tag: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::validation(tag, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_defaults() {
        let text = to_text(&PortSettings::new("/dev/ttyS0"));
        assert_eq!(
            text,
            "<Port>/dev/ttyS0</Port>\n<Bps>9600</Bps>\n<ByteSize>8</ByteSize>\n<StopBits>1</StopBits>\n"
        );
    }

    #[test]
    fn test_render_omits_empty_port_and_shows_parity() {
        let mut settings = PortSettings::default();
        settings.parity = Parity::Even;
        let text = to_text(&settings);
        assert!(!text.contains("<Port>"));
        assert!(text.contains("<Parity>2</Parity>"));
    }

    #[test]
    fn test_apply_reads_known_tags() {
        let mut settings = PortSettings::default();
        apply_text(
            &mut settings,
            "<Port>COM3</Port><Bps>19200</Bps><ByteSize>7</ByteSize>\
             <StopBits>2</StopBits><Parity>1</Parity><Flow>none</Flow>",
        )
        .unwrap();
        assert_eq!(settings.port_name, "COM3");
        assert_eq!(settings.baud_rate, BaudRate::Baud19200);
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.stop_bits, StopBits::Two);
        assert_eq!(settings.parity, Parity::Odd);
    }

    #[test]
    fn test_blank_is_noop() {
        let mut settings = PortSettings::new("COM1");
        apply_text(&mut settings, "  \n ").unwrap();
        assert_eq!(settings, PortSettings::new("COM1"));
    }

    #[test]
    fn test_bad_value_leaves_settings_untouched() {
        let mut settings = PortSettings::new("COM1");
        let err = apply_text(&mut settings, "<Port>COM2</Port><Bps>1234</Bps>").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref key, .. } if key == "Bps"));
        assert_eq!(settings.port_name, "COM1");
    }

    #[test]
    fn test_mismatched_tags() {
        let mut settings = PortSettings::default();
        assert!(apply_text(&mut settings, "<Port>COM2</Bps>").is_err());
        assert!(apply_text(&mut settings, "<Port>COM2").is_err());
    }

    #[test]
    fn test_port_escaping() {
        let mut settings = PortSettings::new("odd<&>name");
        let text = to_text(&settings);
        assert!(text.contains("<Port>odd&lt;&amp;&gt;name</Port>"));

        settings.port_name.clear();
        apply_text(&mut settings, &text).unwrap();
        assert_eq!(settings.port_name, "odd<&>name");
    }

    #[test]
    fn test_character_references_and_cdata() {
        let mut settings = PortSettings::default();
        apply_text(&mut settings, "<Port>a&#60;b&#x3E;c</Port>").unwrap();
        assert_eq!(settings.port_name, "a<b>c");

        apply_text(&mut settings, "<Port><![CDATA[COM<9>&]]></Port>").unwrap();
        assert_eq!(settings.port_name, "COM<9>&");
    }

    #[test]
    fn test_nested_and_stray_tags() {
        let mut settings = PortSettings::default();
        apply_text(&mut settings, "<Serial><Bps>2400</Bps></Serial>").unwrap();
        assert_eq!(settings.baud_rate, BaudRate::Baud2400);

        let before = settings.clone();
        assert!(apply_text(&mut settings, "<Bps>4800</Bps></Serial>").is_err());
        assert_eq!(settings, before);
    }
}
