use super::Sigmoid;

/// An element-wise activation applied after a layer's affine transform.
#[derive(Debug, Clone)]
pub enum ActFn {
    Sigmoid(Sigmoid),
}

impl ActFn {
    pub fn sigmoid() -> Self {
        ActFn::Sigmoid(Sigmoid::new())
    }

    pub fn f(&self, z: f32) -> f32 {
        match self {
            ActFn::Sigmoid(a) => a.f(z),
        }
    }

    pub fn df(&self, z: f32) -> f32 {
        match self {
            ActFn::Sigmoid(a) => a.df(z),
        }
    }
}
