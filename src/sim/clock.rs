/// Episode clock: counts steps up to a hard stop.
///
/// The stop is the smaller of the caller's horizon and the number of data
/// points available in the current window.
///
/// # Examples
///
/// ```
/// use mgrid_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new(3);
/// let mut steps = Vec::new();
///
/// clock.run(|step| steps.push(step));
/// assert_eq!(steps, vec![0, 1, 2]);
/// assert!(clock.is_done());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    /// Steps completed in this episode
    current: usize,
    /// Steps available in this episode
    total: usize,
}

impl Clock {
    /// Creates a new clock with a specified total number of steps.
    ///
    /// # Arguments
    ///
    /// * `total` - The total number of steps the clock will run
    pub fn new(total: usize) -> Self {
        Self { current: 0, total }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(step)` - The step number (starting from 0) before advancing
    /// * `None` - If the clock has reached its total steps
    pub fn tick(&mut self) -> Option<usize> {
        if self.current < self.total {
            let step = self.current;
            self.current += 1;
            Some(step)
        } else {
            None
        }
    }

    /// Runs a function for each remaining step in the clock.
    pub fn run(&mut self, mut f: impl FnMut(usize)) {
        while let Some(step) = self.tick() {
            f(step);
        }
    }

    /// Steps completed so far.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.current >= self.total
    }

    /// Rewinds to step zero with a new total.
    pub fn rewind(&mut self, total: usize) {
        self.current = 0;
        self.total = total;
    }

    /// Changes the total without rewinding.
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock() {
        let clock = Clock::new(5);
        assert_eq!(clock.current, 0);
        assert_eq!(clock.total, 5);
    }

    #[test]
    fn test_tick() {
        let mut clock = Clock::new(2);
        assert_eq!(clock.tick(), Some(0));
        assert!(!clock.is_done());
        assert_eq!(clock.tick(), Some(1));
        assert!(clock.is_done());
        assert_eq!(clock.tick(), None);
    }

    #[test]
    fn test_rewind() {
        let mut clock = Clock::new(2);
        clock.run(|_| {});
        clock.rewind(4);
        assert_eq!(clock.current(), 0);
        assert_eq!(clock.total(), 4);
    }

    #[test]
    fn test_empty_clock() {
        let mut clock = Clock::new(0);
        assert!(clock.is_done());
        assert_eq!(clock.tick(), None);

        let mut was_called = false;
        clock.run(|_| was_called = true);
        assert!(!was_called);
    }
}
