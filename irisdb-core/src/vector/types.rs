/// Represents a dense float feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    pub data: Vec<f32>,
}

impl Vector {
    /// Create a new vector from raw f32 data.
    pub fn new(data: Vec<f32>) -> Self {
        Vector { data }
    }

    /// Get the dimension of the vector.
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    /// Compute the L2 norm of the vector.
    pub fn l2_norm(&self) -> f32 {
        self.data.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Normalize the vector to unit length. Inner-product search assumes
    /// callers applied this before insert and before query; the index
    /// never re-normalizes.
    pub fn normalize(&self) -> Vector {
        let norm = self.l2_norm();
        if norm == 0.0 {
            Vector {
                data: vec![0.0; self.data.len()],
            }
        } else {
            Vector {
                data: self.data.iter().map(|x| x / norm).collect(),
            }
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Vector::new(data)
    }
}
