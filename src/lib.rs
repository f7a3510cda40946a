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

//! axetune - Safety-bounded tuning for BitAxe miners
//!
//! Command-line front end over `at-core`: argument parsing, logging setup,
//! console prompts and the subcommands themselves.

pub mod cli;
pub mod commands;
pub mod logger;
pub mod operator;
