/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

pub mod angles;
pub mod earth;

/// Vector2 of f64 used for positions on the projected plane, in meters.
pub type PlaneVec = nalgebra::Vector2<f64>;
