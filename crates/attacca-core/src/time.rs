//! Schedule time model and adaptive look-ahead windows.
//!
//! A schedule time is always a reference anchor plus a relative onset.
//! Look-ahead windows describe how far ahead of an event a preparatory
//! action (buffer load, graph connect) must begin, and how far past its
//! end cleanup is deferred. The windows self-tune: a miss grows them,
//! an on-time run shrinks them back towards a ratcheting floor.

/// A schedule time decomposed into a reference anchor and an onset delta.
///
/// The absolute transport time is `ref_time + onset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefTimeWithOnset {
    /// Reference anchor in absolute transport seconds.
    pub ref_time: f64,
    /// Relative delta from the anchor, defaults to 0.
    pub onset: f64,
}

impl RefTimeWithOnset {
    /// Create a schedule time with a zero onset.
    pub fn new(ref_time: f64) -> Self {
        Self { ref_time, onset: 0.0 }
    }

    /// Create a schedule time with an explicit onset.
    pub fn with_onset(ref_time: f64, onset: f64) -> Self {
        Self { ref_time, onset }
    }

    /// Absolute transport time.
    pub fn absolute(&self) -> f64 {
        self.ref_time + self.onset
    }
}

/// Look-ahead/look-behind window for one preparatory action.
///
/// `count_in` is how far ahead of the event the action starts, `count_out`
/// how long past the event's end its cleanup is deferred. `min_count_in`
/// is a floor below which `count_in` is never auto-shrunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifeCycleWindow {
    pub count_in: f64,
    pub count_out: f64,
    pub min_count_in: f64,
}

impl LifeCycleWindow {
    pub fn new(count_in: f64, count_out: f64, min_count_in: f64) -> Self {
        Self {
            count_in,
            count_out,
            min_count_in,
        }
    }

    /// Widen the window after a miss.
    ///
    /// Growing from the floor raises the floor with it, so the window
    /// never again shrinks below a level that has proven necessary.
    pub fn grow(&mut self, increment: f64) {
        if self.count_in == self.min_count_in {
            self.min_count_in += increment;
        }
        self.count_in += increment;
    }

    /// Opportunistically narrow the window, clamped at the floor.
    pub fn shrink(&mut self, decrement: f64) {
        self.count_in = self.min_count_in.max(self.count_in - decrement);
    }
}

/// The two look-ahead windows every scheduled audio object needs:
/// one for decoding the buffer and one for building the playback graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicBufferLifeCycle {
    pub connect_to_graph: LifeCycleWindow,
    pub load_buffer: LifeCycleWindow,
    /// Skip loading the buffer entirely when the object is inaudible.
    pub ignore_inaudible: bool,
}

impl Default for DynamicBufferLifeCycle {
    fn default() -> Self {
        Self {
            connect_to_graph: LifeCycleWindow::new(2.0, 2.0, 0.5),
            load_buffer: LifeCycleWindow::new(5.0, 5.0, 1.0),
            ignore_inaudible: false,
        }
    }
}

impl DynamicBufferLifeCycle {
    /// Window during which a released buffer might still be needed.
    ///
    /// Derived from the load window so a buffer is never evicted while
    /// still inside any object's look-ahead/look-behind horizon.
    pub fn min_unused_time(&self) -> f64 {
        self.load_buffer.count_in + self.load_buffer.count_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_absolute_time() {
        assert_relative_eq!(RefTimeWithOnset::new(5.0).absolute(), 5.0);
        assert_relative_eq!(RefTimeWithOnset::with_onset(5.0, 1.5).absolute(), 6.5);
    }

    #[test]
    fn test_grow_from_floor_raises_floor() {
        let mut w = LifeCycleWindow::new(1.0, 1.0, 1.0);
        w.grow(0.5);
        assert_relative_eq!(w.count_in, 1.5);
        assert_relative_eq!(w.min_count_in, 1.5);
    }

    #[test]
    fn test_grow_above_floor_keeps_floor() {
        let mut w = LifeCycleWindow::new(2.0, 1.0, 1.0);
        w.grow(0.5);
        assert_relative_eq!(w.count_in, 2.5);
        assert_relative_eq!(w.min_count_in, 1.0);
    }

    #[test]
    fn test_shrink_clamps_at_floor() {
        let mut w = LifeCycleWindow::new(1.05, 1.0, 1.0);
        for _ in 0..20 {
            w.shrink(0.01);
        }
        assert_eq!(w.count_in, 1.0);
    }

    #[test]
    fn test_window_monotonicity_under_arbitrary_sequences() {
        // After any grow that raises the floor, no sequence of shrinks
        // brings count_in below the new floor.
        let mut w = LifeCycleWindow::new(1.0, 1.0, 1.0);
        let ops: [(bool, f64); 9] = [
            (true, 0.5),
            (false, 0.01),
            (false, 0.3),
            (true, 0.2),
            (false, 1.0),
            (false, 0.01),
            (true, 0.5),
            (false, 2.0),
            (false, 0.01),
        ];
        let mut floor = w.min_count_in;
        for (grow, amount) in ops {
            if grow {
                w.grow(amount);
                floor = w.min_count_in;
            } else {
                w.shrink(amount);
            }
            assert!(w.count_in >= floor, "count_in fell below its floor");
            assert!(w.min_count_in >= floor, "floor went down");
        }
    }

    #[test]
    fn test_min_unused_time() {
        let timings = DynamicBufferLifeCycle::default();
        assert_eq!(timings.min_unused_time(), 10.0);
    }
}
