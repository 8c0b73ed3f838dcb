// SPDX-License-Identifier: MIT

pub mod checksum_utils;
pub mod path_utils;
pub mod time_utils;
