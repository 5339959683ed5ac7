//! Human-readable lifecycle and validation messages.
//!
//! The transport looks texts up through a [`MessageCatalog`] it owns, so a
//! locale is injected per instance rather than registered globally.
//! Templates use `{port}` and `{error}` placeholders.

use std::fmt;

/// Every text the transport produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    ConnectingTo,
    ConnectedTo,
    ConnectFailed,
    ClosingConnection,
    ConnectionClosed,
    ConnectionFailed,
    CountOrEop,
    NoSerialPortSelected,
}

impl Message {
    const fn index(self) -> usize {
        self as usize
    }
}

pub trait MessageCatalog: Send + Sync + fmt::Debug {
    /// Locale tag this catalog serves, e.g. `"en"`.
    fn tag(&self) -> &str;

    fn template(&self, message: Message) -> &str;

    /// Fill in the template for `message`.
    fn format(&self, message: Message, port: &str, error: Option<&dyn fmt::Display>) -> String {
        let text = self.template(message).replace("{port}", port);
        match error {
            Some(err) => text.replace("{error}", &err.to_string()),
            None => text,
        }
    }
}

impl<C: MessageCatalog + ?Sized> MessageCatalog for &C {
    fn tag(&self) -> &str {
        (**self).tag()
    }

    fn template(&self, message: Message) -> &str {
        (**self).template(message)
    }
}

/// Catalog backed by a fixed table of templates.
#[derive(Debug)]
pub struct StaticCatalog {
    tag: &'static str,
    templates: [&'static str; 8],
}

impl MessageCatalog for StaticCatalog {
    fn tag(&self) -> &str {
        self.tag
    }

    fn template(&self, message: Message) -> &str {
        self.templates[message.index()]
    }
}

pub static ENGLISH: StaticCatalog = StaticCatalog {
    tag: "en",
    templates: [
        "Connecting to {port}",
        "Connected to {port}",
        "Connect to {port} failed: {error}",
        "Closing connection to {port}",
        "Connection closed to {port}",
        "Connection failed: {error}",
        "Either Count or EOP must be set",
        "No serial port selected. Please select a serial port.",
    ],
};

pub static GERMAN: StaticCatalog = StaticCatalog {
    tag: "de",
    templates: [
        "Verbindung zu {port} wird hergestellt",
        "Verbunden mit {port}",
        "Verbindung zu {port} fehlgeschlagen: {error}",
        "Verbindung zu {port} wird geschlossen",
        "Verbindung zu {port} wurde geschlossen",
        "Verbindung fehlgeschlagen: {error}",
        "Entweder Count oder EOP muss gesetzt sein",
        "Kein serieller Port ausgewählt. Bitte wählen Sie einen seriellen Port aus.",
    ],
};

pub static FINNISH: StaticCatalog = StaticCatalog {
    tag: "fi",
    templates: [
        "Yhdistetään kohteeseen {port}",
        "Yhdistetty kohteeseen {port}",
        "Yhteyden muodostus kohteeseen {port} epäonnistui: {error}",
        "Suljetaan yhteys kohteeseen {port}",
        "Yhteys suljettu kohteeseen {port}",
        "Yhteyden muodostus epäonnistui: {error}",
        "Joko Count tai EOP on asetettava",
        "Sarjaporttia ei ole valittu. Valitse sarjaportti.",
    ],
};

pub static SWEDISH: StaticCatalog = StaticCatalog {
    tag: "sv",
    templates: [
        "Ansluter till {port}",
        "Ansluten till {port}",
        "Anslutning till {port} misslyckades: {error}",
        "Stänger anslutning till {port}",
        "Anslutning stängd till {port}",
        "Anslutningen misslyckades: {error}",
        "Antingen Count eller EOP måste anges",
        "Ingen seriell port vald. Välj en seriell port.",
    ],
};

pub static SPANISH: StaticCatalog = StaticCatalog {
    tag: "es",
    templates: [
        "Conectando a {port}",
        "Conectado a {port}",
        "Error al conectar con {port}: {error}",
        "Cerrando conexión con {port}",
        "Conexión cerrada con {port}",
        "Error de conexión: {error}",
        "Se debe establecer Count o EOP",
        "No se ha seleccionado ningún puerto serie. Seleccione un puerto serie.",
    ],
};

pub static ESTONIAN: StaticCatalog = StaticCatalog {
    tag: "et",
    templates: [
        "Ühendatakse sihtkohta {port}",
        "Ühendatud sihtkohta {port}",
        "Ühendamine sihtkohta {port} ebaõnnestus: {error}",
        "Suletakse ühendus sihtkohta {port}",
        "Ühendus suleti sihtkohta {port}",
        "Ühendus ebaõnnestus: {error}",
        "Count või EOP peab olema määratud",
        "Ühtegi jadaporti pole valitud. Palun valige jadaport.",
    ],
};

static BUILT_IN: [&StaticCatalog; 6] = [&ENGLISH, &GERMAN, &FINNISH, &SWEDISH, &SPANISH, &ESTONIAN];

/// Built-in catalog for a locale tag such as `de`, `de-DE` or `fi_FI`.
///
/// Unknown languages get English.
pub fn catalog_for(tag: &str) -> &'static StaticCatalog {
    let language = tag
        .split(['-', '_', '.'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    BUILT_IN
        .iter()
        .copied()
        .find(|catalog| catalog.tag == language)
        .unwrap_or(&ENGLISH)
}
