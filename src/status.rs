// Copyright 2025 EventMap Desktop Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Session diagnostics shown in the status bar.
//!
//! A bounded ring of timestamped messages. Failures in this application are
//! non-fatal by design (storage, search, tiles), so the status bar is where
//! the user learns something degraded.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

const MAX_DIAGNOSTICS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// Diagnostic message with timestamp.
#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    pub timestamp: DateTime<Utc>,
    pub level: DiagnosticLevel,
    pub message: String,
}

/// Bounded diagnostics ring for the status bar.
#[derive(Debug, Default)]
pub struct StatusLog {
    diagnostics: VecDeque<DiagnosticMessage>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic message.
    pub fn add(&mut self, level: DiagnosticLevel, message: impl Into<String>) {
        self.diagnostics.push_back(DiagnosticMessage {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        });
        while self.diagnostics.len() > MAX_DIAGNOSTICS {
            self.diagnostics.pop_front();
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.add(DiagnosticLevel::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.add(DiagnosticLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.add(DiagnosticLevel::Error, message);
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&DiagnosticMessage> {
        self.diagnostics.back()
    }

    /// All retained messages, oldest first.
    #[allow(dead_code)]
    pub fn iter(&self) -> impl Iterator<Item = &DiagnosticMessage> {
        self.diagnostics.iter()
    }
}
