//! Piecewise-linear interpolation of scattered 2-D data
//!
//! Points are triangulated with an incremental convex-hull sweep and then
//! made Delaunay by Lawson edge flips. Interpolated values are barycentric
//! blends of the enclosing triangle's vertices; queries outside the convex
//! hull have no value.

use ndarray::Array2;
use std::collections::HashMap;
use tracing::{debug, trace};

const ORIENT_EPS: f64 = 1e-12;
const CIRCLE_EPS: f64 = 1e-13;
const INSIDE_EPS: f64 = 1e-9;
const MAX_FLIP_PASSES: usize = 256;

type Point = [f64; 2];

/// Twice the signed area of `abc`; positive when counter-clockwise
fn orient(a: Point, b: Point, c: Point) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Positive when `d` lies inside the circumcircle of counter-clockwise `abc`
fn in_circle(a: Point, b: Point, c: Point, d: Point) -> f64 {
    let (adx, ady) = (a[0] - d[0], a[1] - d[1]);
    let (bdx, bdy) = (b[0] - d[0], b[1] - d[1]);
    let (cdx, cdy) = (c[0] - d[0], c[1] - d[1]);
    let ad = adx * adx + ady * ady;
    let bd = bdx * bdx + bdy * bdy;
    let cd = cdx * cdx + cdy * cdy;
    adx * (bdy * cd - bd * cdy) - ady * (bdx * cd - bd * cdx) + ad * (bdx * cdy - bdy * cdx)
}

/// Triangulation of a planar point set, triangles stored counter-clockwise
#[derive(Debug, Clone)]
pub struct Triangulation {
    points: Vec<Point>,
    triangles: Vec<[usize; 3]>,
}

impl Triangulation {
    /// Triangulate distinct points; `None` when fewer than three or all collinear
    pub fn new(points: Vec<Point>) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }

        let mut order: Vec<usize> = (0..points.len()).collect();
        order.sort_by(|&i, &j| {
            points[i][0]
                .total_cmp(&points[j][0])
                .then(points[i][1].total_cmp(&points[j][1]))
        });

        let p0 = points[order[0]];
        let p1 = points[order[1]];
        let apex_pos =
            (2..order.len()).find(|&j| orient(p0, p1, points[order[j]]).abs() > ORIENT_EPS)?;
        let apex = order[apex_pos];

        let mut triangles = Vec::with_capacity(2 * points.len());
        for pair in order[..apex_pos].windows(2) {
            triangles.push(ccw(&points, [pair[0], pair[1], apex]));
        }

        let chain = &order[..apex_pos];
        let last = points[chain[chain.len() - 1]];
        let mut hull: Vec<usize> = if orient(p0, last, points[apex]) > 0.0 {
            chain.to_vec()
        } else {
            chain.iter().rev().copied().collect()
        };
        hull.push(apex);

        for &idx in &order[apex_pos + 1..] {
            let p = points[idx];
            let m = hull.len();
            let visible: Vec<bool> = (0..m)
                .map(|i| orient(points[hull[i]], points[hull[(i + 1) % m]], p) < -ORIENT_EPS)
                .collect();

            let Some(start) = (0..m).find(|&i| visible[i] && !visible[(i + m - 1) % m]) else {
                trace!("Point {:?} sees no hull edge, skipping", p);
                continue;
            };

            let mut end = start;
            while visible[(end + 1) % m] && (end + 1) % m != start {
                end = (end + 1) % m;
            }

            let mut i = start;
            loop {
                let a = hull[i];
                let b = hull[(i + 1) % m];
                triangles.push([b, a, idx]);
                if i == end {
                    break;
                }
                i = (i + 1) % m;
            }

            let mut next_hull = Vec::with_capacity(m + 1);
            let mut k = (end + 1) % m;
            loop {
                next_hull.push(hull[k]);
                if k == start {
                    break;
                }
                k = (k + 1) % m;
            }
            next_hull.push(idx);
            hull = next_hull;
        }

        let mut triangulation = Self { points, triangles };
        let flips = triangulation.make_delaunay();
        debug!(
            "Triangulated {} points into {} triangles ({} flips)",
            triangulation.points.len(),
            triangulation.triangles.len(),
            flips
        );
        Some(triangulation)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Lawson flips until no edge violates the empty-circumcircle property
    fn make_delaunay(&mut self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_FLIP_PASSES {
            let mut edges: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
            for (t, tri) in self.triangles.iter().enumerate() {
                for e in 0..3 {
                    let (u, v) = (tri[e], tri[(e + 1) % 3]);
                    edges.entry((u.min(v), u.max(v))).or_default().push(t);
                }
            }

            let mut interior: Vec<((usize, usize), usize, usize)> = edges
                .into_iter()
                .filter(|(_, ts)| ts.len() == 2)
                .map(|(edge, ts)| (edge, ts[0], ts[1]))
                .collect();
            interior.sort_unstable();

            let mut touched = vec![false; self.triangles.len()];
            let mut flips = 0;
            for ((u, v), t1, t2) in interior {
                if touched[t1] || touched[t2] {
                    continue;
                }
                let Some(a) = opposite(&self.triangles[t1], u, v) else { continue };
                let Some(b) = opposite(&self.triangles[t2], u, v) else { continue };

                let tri = self.triangles[t1];
                let [p, q, r] = tri.map(|i| self.points[i]);
                if in_circle(p, q, r, self.points[b]) <= CIRCLE_EPS {
                    continue;
                }

                let (pa, pb) = (self.points[a], self.points[b]);
                let su = orient(pa, pb, self.points[u]);
                let sv = orient(pa, pb, self.points[v]);
                if !(su.abs() > ORIENT_EPS && sv.abs() > ORIENT_EPS && su.signum() != sv.signum()) {
                    continue;
                }

                self.triangles[t1] = ccw(&self.points, [a, b, u]);
                self.triangles[t2] = ccw(&self.points, [a, b, v]);
                touched[t1] = true;
                touched[t2] = true;
                flips += 1;
            }

            total += flips;
            if flips == 0 {
                break;
            }
        }
        total
    }
}

fn ccw(points: &[Point], tri: [usize; 3]) -> [usize; 3] {
    if orient(points[tri[0]], points[tri[1]], points[tri[2]]) < 0.0 {
        [tri[0], tri[2], tri[1]]
    } else {
        tri
    }
}

fn opposite(tri: &[usize; 3], u: usize, v: usize) -> Option<usize> {
    if !(tri.contains(&u) && tri.contains(&v)) {
        return None;
    }
    tri.iter().copied().find(|&w| w != u && w != v)
}

/// Barycentric weights of `p` in `abc`, `None` when outside (with tolerance)
fn barycentric(a: Point, b: Point, c: Point, p: Point) -> Option<[f64; 3]> {
    let area = orient(a, b, c);
    if area.abs() < ORIENT_EPS {
        return None;
    }
    let wa = orient(b, c, p) / area;
    let wb = orient(c, a, p) / area;
    let wc = 1.0 - wa - wb;
    if wa >= -INSIDE_EPS && wb >= -INSIDE_EPS && wc >= -INSIDE_EPS {
        Some([wa, wb, wc])
    } else {
        None
    }
}

/// Linear interpolant over a [`Triangulation`] of sample sites
#[derive(Debug, Clone)]
pub struct LinearInterpolator2D {
    triangulation: Triangulation,
    values: Vec<f64>,
}

impl LinearInterpolator2D {
    /// `samples` are `(x, y, value)`; sites must be distinct
    pub fn new(samples: &[(f64, f64, f64)]) -> Option<Self> {
        let points = samples.iter().map(|&(x, y, _)| [x, y]).collect();
        let values = samples.iter().map(|&(_, _, v)| v).collect();
        let triangulation = Triangulation::new(points)?;
        Some(Self {
            triangulation,
            values,
        })
    }

    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }

    fn blend(&self, tri: &[usize; 3], w: [f64; 3]) -> f64 {
        w[0] * self.values[tri[0]] + w[1] * self.values[tri[1]] + w[2] * self.values[tri[2]]
    }

    /// Interpolated value at one location, `None` outside the convex hull
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        let pts = &self.triangulation.points;
        self.triangulation.triangles.iter().find_map(|tri| {
            barycentric(pts[tri[0]], pts[tri[1]], pts[tri[2]], [x, y]).map(|w| self.blend(tri, w))
        })
    }

    /// Evaluate on the Cartesian product of ascending axes.
    ///
    /// Row `i`, column `j` holds the value at `(xs[j], ys[i])`; cells outside
    /// the convex hull are set to `fill`.
    pub fn grid(&self, xs: &[f64], ys: &[f64], fill: f64) -> Array2<f64> {
        let mut out = Array2::from_elem((ys.len(), xs.len()), fill);
        let pts = &self.triangulation.points;

        for tri in &self.triangulation.triangles {
            let [a, b, c] = tri.map(|i| pts[i]);
            let (min_x, max_x) = (a[0].min(b[0]).min(c[0]), a[0].max(b[0]).max(c[0]));
            let (min_y, max_y) = (a[1].min(b[1]).min(c[1]), a[1].max(b[1]).max(c[1]));

            let x_lo = xs.partition_point(|&x| x < min_x - INSIDE_EPS);
            let x_hi = xs.partition_point(|&x| x <= max_x + INSIDE_EPS);
            let y_lo = ys.partition_point(|&y| y < min_y - INSIDE_EPS);
            let y_hi = ys.partition_point(|&y| y <= max_y + INSIDE_EPS);

            for (i, &y) in ys.iter().enumerate().take(y_hi).skip(y_lo) {
                for (j, &x) in xs.iter().enumerate().take(x_hi).skip(x_lo) {
                    if let Some(w) = barycentric(a, b, c, [x, y]) {
                        out[[i, j]] = self.blend(tri, w);
                    }
                }
            }
        }

        out
    }
}
