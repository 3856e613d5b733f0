// Copyright 2020 The Weft Developers
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

//! Everything one lane runs: protocols, verifier, sync machinery and the
//! service binding them together.

pub mod controller;
pub mod service;
pub mod storage_protocol;
pub mod sync_protocol;
pub mod sync_service;
pub mod tx_finder;
pub mod verifier;
