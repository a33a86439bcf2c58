// blerg: a bytecode-compiled interpreter for a small dynamically typed
// scripting language.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

#[macro_use]
extern crate lazy_static;

// Pipeline: lexer -> parser -> validator -> transform (lowering) ->
// emit (bytecode) -> vm (execution). `compile` wires the first four
// stages together; `stdlib` installs the builtins scope a `vm::Runtime`
// starts from.
pub mod bytecode;
pub mod compile;
pub mod dispatch;
pub mod emit;
pub mod error;
pub mod lexer;
pub mod location;
pub mod parser;
pub mod stdlib;
pub mod symbol;
pub mod token;
pub mod transform;
pub mod validator;
pub mod value;
pub mod vm;
