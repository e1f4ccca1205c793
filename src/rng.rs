//! Random-number generation is consumed only through this interface
//! (§6); the engine never seeds or owns a concrete generator.

pub trait Rng {
    fn uniform_real(&mut self, a: f64, b: f64) -> f64;

    fn uniform_int(&mut self, a: i64, b: i64) -> i64;

    fn gamma(&mut self, shape: f64, scale: f64) -> f64;
}
