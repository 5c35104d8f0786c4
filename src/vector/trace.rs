/*
 * VANTAGE Toolkit
 * Copyright (C) 2024-onward The VANTAGE contributors
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Binary mask → polygons with holes, by boundary tracing on the pixel-edge
//! lattice.
//!
//! Every edge between a foreground cell and background (or the grid rim)
//! becomes a directed segment with foreground on its left; chaining the
//! segments yields closed rings. Foreground is 4-connected: at a
//! checkerboard corner the walk takes the turn that hugs the current cell,
//! so diagonal neighbours stay separate polygons. Ring orientation after
//! mapping to projected coordinates (north up) makes shells counterclockwise
//! and holes clockwise, which is how they are told apart.

use std::collections::HashMap;

use geo_types::{Coord, LineString, MultiPolygon, Polygon};

use crate::raster::GridSpec;

/// Vertex on the (width+1) × (height+1) corner lattice.
type VertexId = u64;

#[derive(Clone, Debug)]
struct Ring {
    /// Shoelace area in projected coordinates; > 0 means shell.
    area_m2: f64,
    /// Closed ring (first == last), projected coordinates.
    coords: Vec<Coord<f64>>,
}

/// Traces a 4-connected foreground mask into polygons, in projected
/// coordinates. Deterministic: rings come out in raster order.
pub fn polygonize(mask: &[bool], grid: &GridSpec) -> MultiPolygon<f64> {
    debug_assert_eq!(mask.len(), grid.len());
    let (w, h) = (grid.width, grid.height);
    let fg = |col: i64, row: i64| -> bool {
        col >= 0
            && row >= 0
            && (col as usize) < w
            && (row as usize) < h
            && mask[row as usize * w + col as usize]
    };
    let vid = |col: i64, row: i64| -> VertexId { row as u64 * (w as u64 + 1) + col as u64 };

    // Directed boundary edges, foreground on the left, in raster order.
    let mut edges: Vec<((i64, i64), (i64, i64))> = Vec::new();
    for row in 0..h as i64 {
        for col in 0..w as i64 {
            if !fg(col, row) {
                continue;
            }
            if !fg(col, row - 1) {
                edges.push(((col + 1, row), (col, row))); // top, westward
            }
            if !fg(col, row + 1) {
                edges.push(((col, row + 1), (col + 1, row + 1))); // bottom, eastward
            }
            if !fg(col - 1, row) {
                edges.push(((col, row), (col, row + 1))); // left, southward
            }
            if !fg(col + 1, row) {
                edges.push(((col + 1, row + 1), (col + 1, row))); // right, northward
            }
        }
    }

    // Outgoing edge indices per start vertex; at most two (checkerboard).
    let mut outgoing: HashMap<VertexId, [usize; 2]> = HashMap::with_capacity(edges.len());
    let mut outgoing_len: HashMap<VertexId, u8> = HashMap::with_capacity(edges.len());
    for (idx, (start, _)) in edges.iter().enumerate() {
        let key = vid(start.0, start.1);
        let slot = outgoing.entry(key).or_insert([usize::MAX; 2]);
        let len = outgoing_len.entry(key).or_insert(0);
        slot[*len as usize] = idx;
        *len += 1;
    }

    let mut used = vec![false; edges.len()];
    let mut rings: Vec<Ring> = Vec::new();

    for seed in 0..edges.len() {
        if used[seed] {
            continue;
        }
        let mut path: Vec<(i64, i64)> = Vec::new();
        let mut closed = false;
        let mut current = seed;
        loop {
            used[current] = true;
            let (start, end) = edges[current];
            path.push(start);
            if end == edges[seed].0 {
                path.push(end);
                closed = true;
                break;
            }
            let d_in = (end.0 - start.0, end.1 - start.1);
            let key = vid(end.0, end.1);
            let slot = outgoing[&key];
            let len = outgoing_len[&key];
            current = if len == 1 {
                slot[0]
            } else {
                // Checkerboard vertex: take the turn that keeps hugging the
                // current foreground cell (negative cross product on the
                // row-down lattice).
                let pick = (0..len as usize).find(|&i| {
                    let e = edges[slot[i]];
                    if used[slot[i]] {
                        return false;
                    }
                    let d_out = (e.1 .0 - e.0 .0, e.1 .1 - e.0 .1);
                    d_in.0 * d_out.1 - d_in.1 * d_out.0 < 0
                });
                match pick {
                    Some(i) => slot[i],
                    // Both used or none turns left: close on whichever remains.
                    None => match (0..len as usize).find(|&i| !used[slot[i]]) {
                        Some(i) => slot[i],
                        None => break,
                    },
                }
            };
        }
        if !closed || path.len() < 4 {
            continue;
        }
        rings.push(build_ring(path, grid));
    }

    assemble(rings, grid.pixel_size_m)
}

/// Drops collinear lattice vertices and computes projected coordinates and
/// the signed area.
fn build_ring(path: Vec<(i64, i64)>, grid: &GridSpec) -> Ring {
    let n = path.len() - 1; // last repeats first
    let mut kept: Vec<(i64, i64)> = Vec::with_capacity(n);
    for i in 0..n {
        let prev = path[(i + n - 1) % n];
        let here = path[i];
        let next = path[(i + 1) % n];
        let d1 = (here.0 - prev.0, here.1 - prev.1);
        let d2 = (next.0 - here.0, next.1 - here.1);
        if d1.0 * d2.1 - d1.1 * d2.0 != 0 {
            kept.push(here);
        }
    }
    // Corner lattice vertex (c, r) sits half a pixel northwest of the pixel
    // centre grid.
    let px = grid.pixel_size_m;
    let x0 = grid.origin_x_m - 0.5 * px;
    let y0 = grid.origin_y_m + 0.5 * px;
    let mut coords: Vec<Coord<f64>> = kept
        .iter()
        .map(|&(c, r)| Coord {
            x: x0 + c as f64 * px,
            y: y0 - r as f64 * px,
        })
        .collect();
    let mut area = 0.0;
    for i in 0..coords.len() {
        let a = coords[i];
        let b = coords[(i + 1) % coords.len()];
        area += a.x * b.y - b.x * a.y;
    }
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    Ring {
        area_m2: 0.5 * area,
        coords,
    }
}

/// Matches holes to the smallest shell containing them.
fn assemble(rings: Vec<Ring>, pixel_size_m: f64) -> MultiPolygon<f64> {
    let (shells, holes): (Vec<Ring>, Vec<Ring>) = rings.into_iter().partition(|r| r.area_m2 > 0.0);
    let mut polygons: Vec<(Ring, Vec<LineString<f64>>)> =
        shells.into_iter().map(|s| (s, Vec::new())).collect();

    for hole in holes {
        // A probe just inside the hole region: midpoint of the first edge,
        // nudged to the walk's right-hand side (background of the fg ring,
        // interior of the hole ring).
        let a = hole.coords[0];
        let b = hole.coords[1];
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let norm = (dx * dx + dy * dy).sqrt();
        let probe = Coord {
            x: (a.x + b.x) / 2.0 + dy / norm * 0.25 * pixel_size_m,
            y: (a.y + b.y) / 2.0 - dx / norm * 0.25 * pixel_size_m,
        };
        let owner = polygons
            .iter_mut()
            .filter(|(shell, _)| point_in_ring(probe, &shell.coords))
            .min_by(|(a, _), (b, _)| a.area_m2.total_cmp(&b.area_m2));
        if let Some((_, hole_list)) = owner {
            hole_list.push(LineString::from(hole.coords));
        }
        // An orphan hole (numerically possible on degenerate masks) is
        // dropped rather than invented as a shell.
    }

    MultiPolygon::new(
        polygons
            .into_iter()
            .map(|(shell, holes)| Polygon::new(LineString::from(shell.coords), holes))
            .collect(),
    )
}

/// Even-odd ray cast; boundary points count as inside, which is the safe
/// direction for hole assignment.
fn point_in_ring(p: Coord<f64>, ring: &[Coord<f64>]) -> bool {
    let mut inside = false;
    let n = ring.len() - 1; // closed
    for i in 0..n {
        let (a, b) = (ring[i], ring[i + 1]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}
