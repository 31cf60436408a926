// smupdate - show and update SnapMirror relationships over ONTAP ZAPI
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! SnapMirror relationship queries and updates.

use crate::client::Session;
use crate::element::{Element, Response};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use thiserror::Error;
use tracing::debug;

pub const QUERY_API: &str = "snapmirror-get-iter";
pub const TRIGGER_API: &str = "snapmirror-update";

pub const REPORT_HEADER: &str = "Source,Destination,State,Status,Lag(Seconds)";
pub const NO_RELATIONSHIP: &str = "No snapmirror relationship found.";

const INFO: &str = "snapmirror-info";
const SOURCE_LOCATION: &str = "source-location";
const DESTINATION_LOCATION: &str = "destination-location";
const RELATIONSHIP_STATUS: &str = "relationship-status";
const MIRROR_STATE: &str = "mirror-state";
const LAG_TIME: &str = "lag-time";

const DESIRED_FIELDS: [&str; 5] = [
    SOURCE_LOCATION,
    DESTINATION_LOCATION,
    RELATIONSHIP_STATUS,
    MIRROR_STATE,
    LAG_TIME,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationError {
    #[error("{0} name must not be empty")]
    Empty(&'static str),
    #[error("{0} name `{1}` must not contain `:`")]
    Separator(&'static str, String),
}

/// Destination path of a relationship, `<svm>:<volume>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination(String);

impl Destination {
    pub fn new(svm: &str, volume: &str) -> Result<Self, DestinationError> {
        validate_part("SVM", svm)?;
        validate_part("volume", volume)?;
        Ok(Self(format!("{svm}:{volume}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn validate_part(kind: &'static str, value: &str) -> Result<(), DestinationError> {
    if value.is_empty() {
        return Err(DestinationError::Empty(kind));
    }
    if value.contains(':') {
        return Err(DestinationError::Separator(kind, value.to_string()));
    }
    Ok(())
}

/// Result of a remote call whose failure is printed rather than raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    RemoteFailure(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorRecord {
    pub source: String,
    pub destination: String,
    pub relationship_status: String,
    pub mirror_state: String,
    pub lag_time: String,
}

impl MirrorRecord {
    pub fn from_element(info: &Element) -> Self {
        let field = |name: &str| info.child_string(name).unwrap_or_default().to_string();
        Self {
            source: field(SOURCE_LOCATION),
            destination: field(DESTINATION_LOCATION),
            relationship_status: field(RELATIONSHIP_STATUS),
            mirror_state: field(MIRROR_STATE),
            lag_time: field(LAG_TIME),
        }
    }

    /// Row under [`REPORT_HEADER`]: mirror state comes before relationship
    /// status, the reverse of the query's field order.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.source,
            self.destination,
            self.mirror_state,
            self.relationship_status,
            self.lag_time
        )
    }
}

pub fn build_query(destination: &Destination) -> Element {
    let desired = DESIRED_FIELDS
        .iter()
        .map(|field| Element::leaf(*field, ""))
        .collect();

    Element::node(
        QUERY_API,
        vec![
            Element::node("desired-attributes", vec![Element::node(INFO, desired)]),
            Element::node(
                "query",
                vec![Element::node(
                    INFO,
                    vec![Element::leaf(DESTINATION_LOCATION, destination.as_str())],
                )],
            ),
        ],
    )
}

pub fn build_trigger(destination: &Destination) -> Element {
    Element::node(
        TRIGGER_API,
        vec![Element::leaf(DESTINATION_LOCATION, destination.as_str())],
    )
}

/// Records in the reply's `attributes-list`, or `None` when the list is absent.
pub fn records(response: &Response) -> Option<Vec<MirrorRecord>> {
    response.child("attributes-list").map(|list| {
        list.children()
            .iter()
            .map(MirrorRecord::from_element)
            .collect()
    })
}

pub fn render<W: Write>(
    response: &Response,
    format: ReportFormat,
    out: &mut W,
) -> io::Result<Outcome<usize>> {
    if !response.is_passed() {
        debug!(errno = ?response.errno, "{QUERY_API} failed");
        match format {
            ReportFormat::Csv => {
                writeln!(out, "Failed {QUERY_API} API call: {}", response.reason())?;
            }
            ReportFormat::Json => {
                let error = serde_json::json!({ "error": response.reason() });
                serde_json::to_writer_pretty(&mut *out, &error)?;
                writeln!(out)?;
            }
        }
        return Ok(Outcome::RemoteFailure(response.reason().to_string()));
    }

    let records = records(response);
    match format {
        ReportFormat::Csv => {
            let Some(records) = records else {
                writeln!(out, "{NO_RELATIONSHIP}")?;
                return Ok(Outcome::Success(0));
            };
            writeln!(out, "{REPORT_HEADER}")?;
            for record in &records {
                writeln!(out, "{}", record.csv_row())?;
            }
            Ok(Outcome::Success(records.len()))
        }
        ReportFormat::Json => {
            let records = records.unwrap_or_default();
            serde_json::to_writer_pretty(&mut *out, &records)?;
            writeln!(out)?;
            Ok(Outcome::Success(records.len()))
        }
    }
}

/// Queries the relationship(s) ending at `destination` and prints them.
pub fn report<W: Write>(
    session: &Session,
    destination: &Destination,
    format: ReportFormat,
    out: &mut W,
) -> io::Result<Outcome<usize>> {
    debug!(%destination, "querying snapmirror relationships");
    let output = session.invoke(&build_query(destination));
    render(&output, format, out)
}

/// Asks the destination to pull pending changes from its source.
pub fn trigger<W: Write>(
    session: &Session,
    destination: &Destination,
    out: &mut W,
) -> io::Result<Outcome<()>> {
    debug!(%destination, "updating snapmirror relationship");
    let output = session.invoke(&build_trigger(destination));
    if !output.is_passed() {
        debug!(errno = ?output.errno, "{TRIGGER_API} failed");
        writeln!(out, "Failed to run {TRIGGER_API} API call: {}", output.reason())?;
        return Ok(Outcome::RemoteFailure(output.reason().to_string()));
    }
    debug!("Success running {TRIGGER_API}.");
    Ok(Outcome::Success(()))
}
