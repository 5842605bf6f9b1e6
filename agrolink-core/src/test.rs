mod window {
    use crate::window::RollingWindow;

    #[test]
    fn capacity_and_order() {
        let mut w = RollingWindow::new(5);
        for i in 0..12u32 {
            w.push(i);
        }
        assert_eq!(w.len(), 5);
        assert_eq!(w.snapshot(), vec![7, 8, 9, 10, 11]);
        assert_eq!(w.capacity(), 5);
    }

    #[test]
    fn positions_are_monotonic_across_eviction() {
        let mut w = RollingWindow::new(3);
        let mut prev = None;
        for i in 0..10u64 {
            let pos = w.push(i);
            assert_eq!(pos, i);
            if let Some(p) = prev {
                assert!(pos > p);
            }
            prev = Some(pos);
        }
        assert_eq!(w.first_position(), 7);
        assert_eq!(w.last(), Some(&9));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut w = RollingWindow::new(4);
        w.push(1.0);
        w.push(2.0);
        let snap = w.snapshot();
        w.push(3.0);
        w.push(4.0);
        w.push(5.0);
        assert_eq!(snap, vec![1.0, 2.0]);
        assert_eq!(w.snapshot(), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn partial_fill() {
        let mut w: RollingWindow<f64> = RollingWindow::new(100);
        assert!(w.is_empty());
        assert_eq!(w.first_position(), 0);
        w.push(21.5);
        assert_eq!(w.len(), 1);
        assert_eq!(w.snapshot(), vec![21.5]);
        assert_eq!(w.first_position(), 0);
    }
}

mod farm {
    use crate::farm::FarmId;
    use std::collections::HashMap;

    #[test]
    fn borrowed_lookup() {
        let mut m: HashMap<FarmId, u32> = HashMap::new();
        m.insert(FarmId::from("AgroFarm"), 1);
        assert_eq!(m.get("AgroFarm"), Some(&1));
        assert_eq!(m.get("FishFarm"), None);
    }

    #[test]
    fn display_roundtrip() {
        let id = FarmId::from("CattleFarm");
        assert_eq!(id.to_string().parse::<FarmId>().unwrap(), id);
        assert_eq!(id.as_str(), "CattleFarm");
    }
}
