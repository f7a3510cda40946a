/*
 * This file is part of axetune.
 *
 * Copyright (C) 2025 axetune contributors
 *
 * axetune is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * axetune is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with axetune. If not, see <https://www.gnu.org/licenses/>.
 */

//! Console prompts for the decisions a sweep hands to the operator.

use std::io::{BufRead, Write};

use tracing::warn;

use at_core::{CandidateConfig, FinalChoice, Operator, OriginalSettings, TrialResult, TuneError};

/// Operator answering on a terminal, or any reader/writer pair in tests
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
    auto_apply: bool,
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            auto_apply: false,
        }
    }

    /// Keep the best result without asking at the end of a sweep.
    pub fn with_auto_apply(mut self, auto_apply: bool) -> Self {
        self.auto_apply = auto_apply;
        self
    }

    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Ask a yes/no question. Anything other than `yes`/`y`, including end
    /// of input, is a no.
    pub fn confirm(&mut self, question: &str) -> bool {
        if write!(self.output, "{} (yes/no): ", question)
            .and_then(|_| self.output.flush())
            .is_err()
        {
            return false;
        }
        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "yes" | "y"),
        }
    }

    fn say(&mut self, text: &str) {
        if let Err(e) = writeln!(self.output, "{}", text) {
            warn!(error = %e, "Failed to write to console");
        }
    }

    /// Risk acknowledgment shown before any sweep.
    pub fn acknowledge_risks(&mut self, danger_voltage_mv: u32) -> bool {
        self.say("WARNING: Overclocking and overvolting can damage your miner.");
        self.say("  - Higher voltage and frequency raise heat and power draw");
        self.say(&format!(
            "  - Voltages at or above {}mV need explicit confirmation",
            danger_voltage_mv
        ));
        self.say("  - Keep the miner supervised and adequately cooled while tuning");
        self.say("Original settings are backed up and restored when the sweep ends.");
        self.confirm("Do you understand the risks and want to continue?")
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn confirm_danger_voltage(&mut self, candidate: CandidateConfig, threshold_mv: u32) -> bool {
        self.say(&format!(
            "WARNING: {} uses {}mV, at or above the {}mV danger threshold.",
            candidate, candidate.core_voltage_mv, threshold_mv
        ));
        self.confirm("Test this voltage anyway?")
    }

    fn final_choice(&mut self, best: &TrialResult, original: Option<OriginalSettings>) -> FinalChoice {
        self.say(&format!(
            "Best stable configuration: {} at {:.1} GH/s ({:.1}°C, {:.1}W)",
            best.candidate, best.mean_hashrate_ghs, best.temperature_c, best.power_w
        ));
        if let Some(o) = original {
            self.say(&format!("Original settings: {}", o));
        }
        if self.auto_apply || self.confirm("Apply the best configuration?") {
            FinalChoice::ApplyBest
        } else {
            FinalChoice::Restore
        }
    }

    fn restore_failed(&mut self, error: &TuneError) {
        self.say(&format!(
            "ERROR: the miner could not be returned to a known configuration: {}",
            error
        ));
        self.say("Check its settings manually before leaving it unattended.");
    }
}
