//! Sampling strategies for hyperparameter optimization
//!
//! Samplers see the history of completed trials as `(params, loss)` pairs,
//! where lower loss is better. The optimizer negates maximized objectives
//! before handing them over.

use super::search_space::{Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};

/// Type of sampler to use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SamplerType {
    /// Random sampling
    Random,
    /// Tree-structured Parzen Estimator
    TPE,
}

/// Trait for hyperparameter samplers
pub trait Sampler: Send {
    /// Sample the next set of hyperparameters
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams;
}

fn seeded_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: seeded_rng(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, search_space: &SearchSpace, _history: &[(TrialParams, f64)]) -> TrialParams {
        search_space.sample(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator sampler
///
/// Completed trials are split into a "below" group holding the best
/// `min(ceil(0.1 n), 25)` losses and an "above" group with the rest. Each
/// parameter gets one density per group, `l(x)` and `g(x)`; candidates are
/// drawn from `l` and the one maximizing `l(x) / g(x)` wins. Parameters are
/// modeled independently.
#[derive(Debug)]
pub struct TPESampler {
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    n_candidates: usize,
    prior_weight: f64,
}

impl TPESampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
            n_startup_trials: 10,
            n_candidates: 24,
            prior_weight: 1.0,
        }
    }

    /// Set number of random startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set number of candidates drawn from `l(x)` per parameter
    pub fn with_n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    fn n_below(n: usize) -> usize {
        ((0.1 * n as f64).ceil() as usize).clamp(1, 25)
    }

    fn sample_parameter(&mut self, param: &Parameter, below: &[&TrialParams], above: &[&TrialParams]) -> ParameterValue {
        let observed = |group: &[&TrialParams]| -> Vec<ParameterValue> {
            group
                .iter()
                .filter_map(|t| t.get(&param.name))
                .filter(|v| param.contains(v))
                .cloned()
                .collect()
        };
        let (obs_below, obs_above) = (observed(below), observed(above));

        match &param.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let to_internal = |v: f64| if *log_scale { v.ln() } else { v };
                let (lo, hi) = (to_internal(*low), to_internal(*high));
                if hi - lo <= 0.0 {
                    return ParameterValue::Float(*low);
                }
                let numbers = |obs: &[ParameterValue]| -> Vec<f64> {
                    obs.iter().filter_map(|v| v.as_float()).map(to_internal).collect()
                };
                let x = self.best_numeric(&numbers(&obs_below), &numbers(&obs_above), lo, hi);
                let x = if *log_scale { x.exp() } else { x };
                ParameterValue::Float(x.clamp(*low, *high))
            }
            ParameterType::Int { low, high } => {
                let (lo, hi) = (*low as f64 - 0.5, *high as f64 + 0.5);
                let numbers = |obs: &[ParameterValue]| -> Vec<f64> {
                    obs.iter().filter_map(|v| v.as_int()).map(|v| v as f64).collect()
                };
                let x = self.best_numeric(&numbers(&obs_below), &numbers(&obs_above), lo, hi);
                ParameterValue::Int((x.round() as i64).clamp(*low, *high))
            }
            ParameterType::Categorical { choices } => {
                let index_of = |obs: &[ParameterValue]| -> Vec<usize> {
                    obs.iter()
                        .filter_map(|v| v.as_string())
                        .filter_map(|s| choices.iter().position(|c| c == s))
                        .collect()
                };
                let idx = self.best_categorical(&index_of(&obs_below), &index_of(&obs_above), choices.len());
                ParameterValue::String(choices[idx].clone())
            }
            ParameterType::Boolean => {
                let index_of = |obs: &[ParameterValue]| -> Vec<usize> {
                    obs.iter().filter_map(|v| v.as_bool()).map(usize::from).collect()
                };
                let idx = self.best_categorical(&index_of(&obs_below), &index_of(&obs_above), 2);
                ParameterValue::Bool(idx == 1)
            }
        }
    }

    fn best_numeric(&mut self, below: &[f64], above: &[f64], low: f64, high: f64) -> f64 {
        let l = ParzenEstimator::new(below, low, high, self.prior_weight);
        let g = ParzenEstimator::new(above, low, high, self.prior_weight);

        let mut best = (f64::NEG_INFINITY, (low + high) / 2.0);
        for _ in 0..self.n_candidates {
            let x = l.sample(&mut self.rng);
            let score = l.log_pdf(x) - g.log_pdf(x);
            if score > best.0 {
                best = (score, x);
            }
        }
        best.1
    }

    fn best_categorical(&mut self, below: &[usize], above: &[usize], n_choices: usize) -> usize {
        let weights = |obs: &[usize]| -> Vec<f64> {
            let mut w = vec![self.prior_weight; n_choices];
            for &i in obs {
                w[i] += 1.0;
            }
            let total: f64 = w.iter().sum();
            w.into_iter().map(|v| v / total).collect()
        };
        let (l, g) = (weights(below), weights(above));

        let mut best = (f64::NEG_INFINITY, 0);
        for _ in 0..self.n_candidates {
            let mut u = self.rng.gen::<f64>();
            let mut idx = n_choices - 1;
            for (i, &p) in l.iter().enumerate() {
                if u < p {
                    idx = i;
                    break;
                }
                u -= p;
            }
            let score = l[idx].ln() - g[idx].ln();
            if score > best.0 {
                best = (score, idx);
            }
        }
        best.1
    }
}

impl Sampler for TPESampler {
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams {
        let mut sorted: Vec<&(TrialParams, f64)> = history.iter().filter(|(_, v)| v.is_finite()).collect();

        // Random sampling until enough trials have completed
        if sorted.len() < self.n_startup_trials.max(2) {
            return search_space.sample(&mut self.rng);
        }

        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
        let n_below = Self::n_below(sorted.len());
        let below: Vec<&TrialParams> = sorted[..n_below].iter().map(|(p, _)| p).collect();
        let above: Vec<&TrialParams> = sorted[n_below..].iter().map(|(p, _)| p).collect();

        search_space
            .parameters()
            .iter()
            .map(|p| (p.name.clone(), self.sample_parameter(p, &below, &above)))
            .collect()
    }
}

/// Equal-weight mixture of truncated Gaussians over `[low, high]`: one
/// component per observation plus a broad prior centered on the range.
struct ParzenEstimator {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    weights: Vec<f64>,
    low: f64,
    high: f64,
}

impl ParzenEstimator {
    fn new(observations: &[f64], low: f64, high: f64, prior_weight: f64) -> Self {
        let range = high - low;
        let mut mus: Vec<f64> = observations.iter().map(|v| v.clamp(low, high)).collect();
        let mut weights = vec![1.0; mus.len()];
        mus.push((low + high) / 2.0);
        weights.push(prior_weight);

        // Bandwidth: distance to the farther sorted neighbor, bounds included
        let mut order: Vec<usize> = (0..mus.len()).collect();
        order.sort_by(|&a, &b| mus[a].total_cmp(&mus[b]));
        let min_sigma = range / (1.0 + mus.len() as f64).min(100.0);
        let mut sigmas = vec![range; mus.len()];
        for (rank, &i) in order.iter().enumerate() {
            let left = if rank == 0 { low } else { mus[order[rank - 1]] };
            let right = if rank + 1 == order.len() { high } else { mus[order[rank + 1]] };
            sigmas[i] = (mus[i] - left).max(right - mus[i]).clamp(min_sigma, range);
        }
        // The prior stays broad
        if let Some(last) = sigmas.last_mut() {
            *last = range;
        }

        let total: f64 = weights.iter().sum();
        let weights = weights.into_iter().map(|w| w / total).collect();

        Self { mus, sigmas, weights, low, high }
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        let mut u = rng.gen::<f64>();
        let mut k = self.mus.len() - 1;
        for (i, &w) in self.weights.iter().enumerate() {
            if u < w {
                k = i;
                break;
            }
            u -= w;
        }

        for _ in 0..100 {
            let x = self.mus[k] + self.sigmas[k] * standard_normal(rng);
            if x >= self.low && x <= self.high {
                return x;
            }
        }
        self.mus[k]
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let terms: Vec<f64> = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .zip(&self.weights)
            .map(|((&mu, &sigma), &w)| {
                let z = (x - mu) / sigma;
                let mass = (normal_cdf((self.high - mu) / sigma) - normal_cdf((self.low - mu) / sigma)).max(1e-12);
                w.ln() - 0.5 * z * z - (sigma * (2.0 * PI).sqrt()).ln() - mass.ln()
            })
            .collect();

        let max = terms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
    }
}

/// Box-Muller draw
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / SQRT_2))
}

/// Abramowitz-Stegun 7.1.26, absolute error below 1.5e-7
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t * (0.254_829_592
        + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Create a sampler from type
pub fn create_sampler(sampler_type: SamplerType, seed: Option<u64>, n_startup_trials: usize) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::TPE => Box::new(TPESampler::new(seed).with_n_startup(n_startup_trials)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic_history(space: &SearchSpace, n: usize, seed: u64) -> Vec<(TrialParams, f64)> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let p = space.sample(&mut rng);
                let x = p["x"].as_float().unwrap();
                (p, (x - 0.8).powi(2))
            })
            .collect()
    }

    #[test]
    fn test_random_sampler() {
        let space = SearchSpace::new().float("lr", 0.001, 0.1).int("n", 10, 100);
        let mut sampler = RandomSampler::new(Some(42));
        let params = sampler.sample(&space, &[]);
        assert!(space.contains(&params));
    }

    #[test]
    fn test_tpe_is_seed_deterministic() {
        let space = SearchSpace::new().float("x", 0.0, 1.0).categorical("c", vec!["a", "b"]);
        let history = quadratic_history(&space, 30, 3);
        let a = TPESampler::new(Some(42)).sample(&space, &history);
        let b = TPESampler::new(Some(42)).sample(&space, &history);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tpe_concentrates_near_good_region() {
        let space = SearchSpace::new().float("x", 0.0, 1.0);
        let history = quadratic_history(&space, 40, 7);
        let mut sampler = TPESampler::new(Some(1));
        let mean_dist: f64 = (0..50)
            .map(|_| (sampler.sample(&space, &history)["x"].as_float().unwrap() - 0.8).abs())
            .sum::<f64>()
            / 50.0;
        // uniform draws would average about 0.34 away from 0.8
        assert!(mean_dist < 0.25, "mean distance {}", mean_dist);
    }

    #[test]
    fn test_tpe_samples_stay_in_domain() {
        let space = SearchSpace::new()
            .log_float("lr", 0.01, 0.3)
            .int("depth", 3, 15)
            .categorical("w", vec!["uniform", "distance"])
            .boolean("bootstrap");
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let history: Vec<(TrialParams, f64)> = (0..20)
            .map(|i| (space.sample(&mut rng), i as f64))
            .collect();
        let mut sampler = TPESampler::new(Some(9));
        for _ in 0..50 {
            assert!(space.contains(&sampler.sample(&space, &history)));
        }
    }

    #[test]
    fn test_parzen_density_integrates_to_one() {
        let pe = ParzenEstimator::new(&[0.2, 0.25, 0.9], 0.0, 1.0, 1.0);
        let n = 10_000;
        let integral: f64 = (0..n)
            .map(|i| pe.log_pdf((i as f64 + 0.5) / n as f64).exp())
            .sum::<f64>()
            / n as f64;
        assert!((integral - 1.0).abs() < 1e-3, "integral {}", integral);
    }

    #[test]
    fn test_erf_reference_values() {
        assert!(erf(0.0).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
    }
}
