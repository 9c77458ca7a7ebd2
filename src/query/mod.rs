// overlay-search - unstructured peer-to-peer content-search overlay node
// Copyright (C) 2026  overlay-search contributors
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

//! Query Engine and its three pieces of owned state: the local matching
//! rule, the query-seen set, and the pending-query table.

mod engine;
mod matching;
mod pending;
mod seen;

pub use engine::{ObservedResult, QueryEngine};
pub use matching::{matches, search_local};
pub use pending::{PendingQueryHandle, SearchHit};
pub use seen::{forwarding_id, origination_id, QuerySeenHandle};
