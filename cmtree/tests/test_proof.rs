use cmtree::{
    merkletree::proof::{check_proof, fold_proof},
    test_helper::{make_data, FIXTURE_DATA, FIXTURE_ROOT},
    utils::hasher,
    Direction, MerkleTree, ProofEntry, Sha256Ops,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_root_is_deterministic() {
    init_logger();
    let t1 = MerkleTree::new(&FIXTURE_DATA).unwrap();
    let t2 = MerkleTree::new(&FIXTURE_DATA).unwrap();
    assert_eq!(t1.root_hash(), t2.root_hash());
    assert_eq!(FIXTURE_ROOT, hasher::to_hex(&t1.root_hash()));
}

#[test]
fn test_root_is_case_sensitive() {
    let lower: Vec<String> = FIXTURE_DATA.iter().map(|s| s.to_lowercase()).collect();
    let t1 = MerkleTree::new(&FIXTURE_DATA).unwrap();
    let t2 = MerkleTree::new(&lower).unwrap();
    assert_ne!(t1.root_hash(), t2.root_hash());
}

#[test]
fn test_any_single_change_moves_the_root() {
    let data = make_data(9);
    let base = MerkleTree::new(&data).unwrap().root_hash();
    for i in 0..data.len() {
        let mut changed = data.clone();
        changed[i].push('x');
        assert_ne!(base, MerkleTree::new(&changed).unwrap().root_hash(), "leaf {}", i);
        let mut swapped = data.clone();
        swapped[i] = swapped[i].to_uppercase();
        assert_ne!(base, MerkleTree::new(&swapped).unwrap().root_hash(), "leaf {}", i);
    }
}

#[test]
fn test_every_leaf_proof_round_trips() {
    for n in 1..=17 {
        let data = make_data(n);
        let tree = MerkleTree::new(&data).unwrap();
        for v in &data {
            let proof = tree.get_proof(v);
            if n == 1 {
                assert!(proof.is_empty());
                assert!(!tree.verify_proof(v, &proof));
                continue;
            }
            // every leaf sits at the same depth
            assert_eq!(n.next_power_of_two().trailing_zeros() as usize, proof.len());
            assert!(tree.verify_proof(v, &proof), "n={} v={}", n, v);

            let leaf = tree.find_leaf(v).unwrap();
            let leaf_digest = tree.leaf_digest(&leaf).unwrap();
            assert_eq!(tree.root_hash(), fold_proof(&Sha256Ops, &leaf_digest, &proof));
        }
    }
}

#[test]
fn test_missing_value_gives_empty_proof_and_false() {
    let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
    let proof = tree.get_proof("c");
    assert!(proof.is_empty());
    assert!(!tree.verify_proof("c", &proof));
    assert!(!tree.verify_proof("c", &tree.get_proof("C")));
}

#[test]
fn test_removing_an_entry_rejects_the_proof() {
    let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
    let proof = tree.get_proof("C");
    for i in 0..proof.len() {
        let mut shorter = proof.clone();
        shorter.remove(i);
        assert!(!tree.verify_proof("C", &shorter), "removed {}", i);
    }
    assert!(!tree.verify_proof("C", &[]));
}

#[test]
fn test_mutating_an_entry_rejects_the_proof() {
    let tree = MerkleTree::new(&make_data(11)).unwrap();
    let proof = tree.get_proof("v6");
    assert!(tree.verify_proof("v6", &proof));
    for i in 0..proof.len() {
        let mut flipped = proof.clone();
        flipped[i].direction = match flipped[i].direction {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        };
        assert!(!tree.verify_proof("v6", &flipped), "flipped {}", i);

        let mut corrupted = proof.clone();
        corrupted[i].sibling[0] ^= 1;
        assert!(!tree.verify_proof("v6", &corrupted), "corrupted {}", i);
    }
}

#[test]
fn test_proof_of_another_leaf_is_rejected() {
    let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
    assert!(!tree.verify_proof("B", &tree.get_proof("C")));
    // A and B are siblings, so their proofs differ only in the first step
    let pa = tree.get_proof("A");
    let pb = tree.get_proof("B");
    assert_eq!(pa[1..], pb[1..]);
    assert_ne!(pa[0], pb[0]);
}

#[test]
fn test_stateless_check_against_a_saved_root() {
    let tree = MerkleTree::new(&FIXTURE_DATA).unwrap();
    let root = tree.root_hash();
    let proof: Vec<ProofEntry> = tree.get_proof("D");
    let leaf_digest = hasher::hash("D");
    assert!(check_proof(&Sha256Ops, &leaf_digest, &proof, &root));

    tree.update_single_leaf("A", "a").unwrap();
    // old proof still checks against the old root, not the new one
    assert!(check_proof(&Sha256Ops, &leaf_digest, &proof, &root));
    assert!(!tree.verify_proof("D", &proof));
    assert!(tree.verify_proof("D", &tree.get_proof("D")));
}
