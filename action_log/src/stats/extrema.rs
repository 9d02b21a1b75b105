use crate::errors::ConfigError;

/// Retains the largest `k` values seen, sorted ascending.
///
/// Values that cannot enter the retained window are rejected by a cheap
/// boundary check before any binary search runs.
#[derive(Debug, Clone)]
pub struct MaxAccumulator {
    window: Vec<f64>,
    capacity: usize,
}

impl MaxAccumulator {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            window: Vec::with_capacity(capacity),
            capacity,
        })
    }

    pub fn add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        if self.window.len() == self.capacity {
            if value <= self.window[0] {
                return;
            }
            let at = self.window.partition_point(|&retained| retained <= value);
            self.window.insert(at, value);
            self.window.remove(0);
        } else {
            let at = self.window.partition_point(|&retained| retained <= value);
            self.window.insert(at, value);
        }
    }

    /// The retained top-k values, ascending.
    pub fn values(&self) -> &[f64] {
        &self.window
    }

    pub fn max(&self) -> Option<f64> {
        self.window.last().copied()
    }
}

/// Retains the smallest `k` values seen, sorted ascending.
#[derive(Debug, Clone)]
pub struct MinAccumulator {
    window: Vec<f64>,
    capacity: usize,
}

impl MinAccumulator {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            window: Vec::with_capacity(capacity),
            capacity,
        })
    }

    pub fn add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        if self.window.len() == self.capacity {
            match self.window.last() {
                Some(&largest) if value >= largest => return,
                _ => {}
            }
            let at = self.window.partition_point(|&retained| retained <= value);
            self.window.insert(at, value);
            self.window.pop();
        } else {
            let at = self.window.partition_point(|&retained| retained <= value);
            self.window.insert(at, value);
        }
    }

    /// The retained bottom-k values, ascending.
    pub fn values(&self) -> &[f64] {
        &self.window
    }

    pub fn min(&self) -> Option<f64> {
        self.window.first().copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_window_is_rejected() {
        assert_eq!(Err(ConfigError::ZeroWindow), MaxAccumulator::new(0).map(|_| ()));
        assert_eq!(Err(ConfigError::ZeroWindow), MinAccumulator::new(0).map(|_| ()));
    }

    #[test]
    fn retained_set_is_the_true_top_k_regardless_of_order() {
        let inputs = [5.0, 1.0, 9.0, 3.0, 7.0, 2.0, 8.0, 6.0, 4.0, 0.0];
        let mut forward = MaxAccumulator::new(3).expect("3 is a valid window");
        let mut reverse = MaxAccumulator::new(3).expect("3 is a valid window");
        for &v in &inputs {
            forward.add(v);
        }
        for &v in inputs.iter().rev() {
            reverse.add(v);
        }
        assert_eq!(&[7.0, 8.0, 9.0], forward.values());
        assert_eq!(&[7.0, 8.0, 9.0], reverse.values());
        assert_eq!(Some(9.0), forward.max());
    }

    #[test]
    fn retained_set_is_the_true_bottom_k() {
        let mut acc = MinAccumulator::new(4).expect("4 is a valid window");
        for v in [10.0, -2.0, 7.0, 3.0, 0.0, 5.0, -1.0] {
            acc.add(v);
        }
        assert_eq!(&[-2.0, -1.0, 0.0, 3.0], acc.values());
        assert_eq!(Some(-2.0), acc.min());
    }

    #[test]
    fn out_of_window_values_are_rejected() {
        let mut acc = MaxAccumulator::new(2).expect("2 is a valid window");
        for v in [5.0, 6.0] {
            acc.add(v);
        }
        acc.add(1.0);
        assert_eq!(&[5.0, 6.0], acc.values());
    }

    #[test]
    fn duplicates_are_retained() {
        let mut acc = MaxAccumulator::new(3).expect("3 is a valid window");
        for v in [4.0, 4.0, 4.0, 1.0] {
            acc.add(v);
        }
        assert_eq!(&[4.0, 4.0, 4.0], acc.values());
    }
}
